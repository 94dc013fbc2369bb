use std::{error::Error, sync::Arc, time::Duration};
use thiserror::Error;

/// Error type page sources report failures with.
pub type PageSourceError = Box<dyn Error + Send + Sync>;

/// Errors surfaced by a [`RowSet`](crate::RowSet).
///
/// Cloneable so a single fetch outcome can be handed to every caller waiting
/// on it.
#[derive(Error, Debug, Clone)]
pub enum CursorError {
    #[error("A page source is already bound to this row set")]
    PageSourceAlreadyBound,

    #[error("Row set has a paging state but no page source is bound")]
    MissingPageSource,

    #[error("Cannot add rows to a void result")]
    VoidResult,

    #[error("Timed out after {timeout:?} waiting for the next page")]
    FetchTimeout { timeout: Duration },

    #[error("Page fetch failed: {0}")]
    Fetch(#[source] Arc<dyn Error + Send + Sync>),

    #[error("Page fetch task did not complete: {0}")]
    FetchTaskAborted(String),

    #[error("No tokio runtime available to run page fetches: {0}")]
    NoRuntime(String),
}

impl CursorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CursorError::FetchTimeout { .. })
    }
}

impl From<PageSourceError> for CursorError {
    fn from(error: PageSourceError) -> Self {
        CursorError::Fetch(Arc::from(error))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}
