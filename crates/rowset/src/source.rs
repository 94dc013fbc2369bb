use crate::{
    config::PagingConfig,
    error::{CursorError, PageSourceError},
};
use async_trait::async_trait;
use model::pagination::{page::Page, paging_state::PagingState};
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tokio::runtime::Handle;

/// Produces the page that follows a paging state.
///
/// Implemented by whatever owns the connection: it re-issues the original
/// query with the given paging state and decodes the response.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, paging_state: PagingState) -> Result<Page, PageSourceError>;
}

#[async_trait]
impl<S: PageSource + ?Sized> PageSource for Arc<S> {
    async fn fetch_page(&self, paging_state: PagingState) -> Result<Page, PageSourceError> {
        (**self).fetch_page(paging_state).await
    }
}

/// A [`PageSource`] backed by an async closure.
pub struct FnPageSource<F> {
    fetch: F,
}

/// Wrap an async closure as a [`PageSource`].
pub fn page_source_fn<F, Fut>(fetch: F) -> FnPageSource<F>
where
    F: Fn(PagingState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page, PageSourceError>> + Send,
{
    FnPageSource { fetch }
}

#[async_trait]
impl<F, Fut> PageSource for FnPageSource<F>
where
    F: Fn(PagingState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page, PageSourceError>> + Send,
{
    async fn fetch_page(&self, paging_state: PagingState) -> Result<Page, PageSourceError> {
        (self.fetch)(paging_state).await
    }
}

/// A page source together with where its fetches run and how long blocking
/// callers wait for them.
#[derive(Clone)]
pub struct PageFetcher {
    pub(crate) source: Arc<dyn PageSource>,
    pub(crate) runtime: Handle,
    pub(crate) abort_timeout: Duration,
}

impl PageFetcher {
    /// Build a fetcher that spawns onto the tokio runtime the caller is in.
    pub fn new<S>(source: S, config: &PagingConfig) -> Result<Self, CursorError>
    where
        S: PageSource + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| CursorError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(source, runtime, config.abort_timeout))
    }

    pub fn with_runtime<S>(source: S, runtime: Handle, abort_timeout: Duration) -> Self
    where
        S: PageSource + 'static,
    {
        Self {
            source: Arc::new(source),
            runtime,
            abort_timeout,
        }
    }

    pub fn abort_timeout(&self) -> Duration {
        self.abort_timeout
    }
}

impl fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFetcher")
            .field("abort_timeout", &self.abort_timeout)
            .finish_non_exhaustive()
    }
}
