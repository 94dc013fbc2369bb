use crate::{
    config::PagingConfig,
    error::{CursorError, PageSourceError},
    handle::{FetchHandle, HandleState},
    latch::{Claim, FetchLatch, ReleaseOnDrop},
    queue::RowQueue,
    rows::Rows,
    source::PageFetcher,
    stats::{PagingStats, PagingStatsSnapshot},
};
use arc_swap::ArcSwapOption;
use futures::{FutureExt, Stream, stream};
use model::{
    execution::metadata::{ColumnSpec, ExecutionInfo, ResultMetadata},
    pagination::{page::Page, paging_state::PagingState},
    records::row::Row,
};
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, RecvTimeoutError},
};
use tokio::sync::oneshot;
use tracing::{Instrument, debug, debug_span, trace, warn};

/// The rows of one query result, fetched page by page.
///
/// Cloning is cheap and every clone drains the same rows. A row is handed to
/// exactly one consumer. A void row set, built for responses without a result
/// table, has no rows and never fetches.
#[derive(Clone)]
pub struct RowSet {
    inner: Arc<Inner>,
}

struct Inner {
    metadata: ResultMetadata,
    info: ExecutionInfo,
    /// `None` for a void result
    queue: Option<RowQueue>,
    paging_state: ArcSwapOption<PagingState>,
    auto_page: AtomicBool,
    fetcher: OnceLock<PageFetcher>,
    latch: Arc<FetchLatch>,
    stats: PagingStats,
}

/// What asked for the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demand {
    /// An explicit fetch call, which prefetches even with rows on hand
    Explicit,
    /// A consumer that found no rows left
    Drained,
}

impl RowSet {
    /// An empty row set with no paging state and auto paging on.
    pub fn new(metadata: ResultMetadata, info: ExecutionInfo) -> Self {
        Self::build(metadata, info, Some(RowQueue::new()))
    }

    /// A row set for a response that carries no rows at all.
    pub fn void(info: ExecutionInfo) -> Self {
        Self::build(ResultMetadata::default(), info, None)
    }

    fn build(metadata: ResultMetadata, info: ExecutionInfo, queue: Option<RowQueue>) -> Self {
        RowSet {
            inner: Arc::new(Inner {
                metadata,
                info,
                queue,
                paging_state: ArcSwapOption::empty(),
                auto_page: AtomicBool::new(true),
                fetcher: OnceLock::new(),
                latch: Arc::default(),
                stats: PagingStats::default(),
            }),
        }
    }

    /// Set the paging state returned with the first page.
    ///
    /// For the code assembling the row set. Only takes effect on the sole
    /// handle to a row set that has not fetched yet, so a paging state that
    /// has run out can never come back. Ignored with a warning otherwise, and
    /// on a void row set.
    pub fn with_paging_state(mut self, paging_state: PagingState) -> Self {
        if self.is_void() {
            warn!("Ignoring paging state on a void result");
            return self;
        }
        match Arc::get_mut(&mut self.inner) {
            Some(inner) if !inner.stats.has_fetched() => {
                inner.paging_state.store(Some(Arc::new(paging_state)));
            }
            _ => warn!("Ignoring paging state on a row set already in use"),
        }
        self
    }

    pub fn with_config(self, config: &PagingConfig) -> Self {
        self.set_auto_page(config.auto_page);
        self
    }

    pub fn is_void(&self) -> bool {
        self.inner.queue.is_none()
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.inner.metadata
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.inner.metadata.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.inner.metadata.index_of(name)
    }

    pub fn info(&self) -> &ExecutionInfo {
        &self.inner.info
    }

    pub fn auto_page(&self) -> bool {
        self.inner.auto_page.load(Ordering::Acquire)
    }

    /// With auto paging off, running out of rows ends the result even if a
    /// paging state is present. The caller can page manually with
    /// [`RowSet::paging_state`].
    pub fn set_auto_page(&self, auto_page: bool) {
        self.inner.auto_page.store(auto_page, Ordering::Release);
    }

    /// The token for the page after the rows fetched so far, if any.
    pub fn paging_state(&self) -> Option<PagingState> {
        self.inner.paging_state.load_full().map(|s| PagingState::clone(&s))
    }

    /// Bind the source of further pages. Only the first binding takes effect.
    pub fn bind_page_source(&self, fetcher: PageFetcher) -> Result<(), CursorError> {
        self.inner
            .fetcher
            .set(fetcher)
            .map_err(|_| CursorError::PageSourceAlreadyBound)
    }

    /// Queue a decoded row. For the code that decodes responses, not for consumers.
    pub fn add_row(&self, row: Row) -> Result<(), CursorError> {
        let queue = self.inner.queue.as_ref().ok_or(CursorError::VoidResult)?;
        queue.push(row);
        Ok(())
    }

    /// Number of rows that can be taken without a fetch. Never fetches.
    pub fn available_without_fetching(&self) -> usize {
        self.inner.queue.as_ref().map_or(0, RowQueue::len)
    }

    /// True once no further page will ever be requested.
    pub fn is_fully_fetched(&self) -> bool {
        !self.inner.wants_more_pages()
    }

    /// Whether there are no rows left, fetching one page first if needed.
    ///
    /// If a fetch is already running this waits on it rather than report
    /// `true` early. A `false` answer can be stale by the time the caller acts
    /// on it when other consumers are draining the same rows.
    pub fn is_exhausted(&self) -> Result<bool, CursorError> {
        if self.available_without_fetching() > 0 {
            return Ok(false);
        }
        self.wait_for(self.inner.begin_fetch(Demand::Drained))?;
        Ok(self.available_without_fetching() == 0)
    }

    /// Start fetching the next page, or join the fetch already running.
    ///
    /// Settles immediately, with no effect, when there is no next page or
    /// auto paging is off.
    pub fn fetch_more_results_async(&self) -> FetchHandle {
        self.inner.begin_fetch(Demand::Explicit)
    }

    /// Fetch the next page, blocking the calling thread until it is merged.
    ///
    /// Gives up with [`CursorError::FetchTimeout`] after the abort timeout
    /// the page source was bound with. The fetch itself keeps running and
    /// other callers waiting on it still see its outcome.
    ///
    /// Must not be called from a thread driving the fetch runtime, since the
    /// fetch could then never make progress.
    pub fn fetch_more_results(&self) -> Result<(), CursorError> {
        self.wait_for(self.inner.begin_fetch(Demand::Explicit))
    }

    fn wait_for(&self, handle: FetchHandle) -> Result<(), CursorError> {
        let fetch = match handle.into_state() {
            HandleState::Settled(result) => return result.unwrap_or(Ok(())),
            HandleState::InFlight(fetch) => fetch,
        };
        if let Some(result) = fetch.peek() {
            return result.clone();
        }
        // Only a bound fetcher can have produced an in-flight handle
        let fetcher = self
            .inner
            .fetcher
            .get()
            .ok_or(CursorError::MissingPageSource)?;
        let timeout = fetcher.abort_timeout;

        let (tx, rx) = mpsc::sync_channel(1);
        fetcher.runtime.spawn(async move {
            let _ = tx.send(fetch.await);
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.inner.stats.record_timeout();
                warn!(?timeout, "Gave up waiting for the next page, fetch left running");
                Err(CursorError::FetchTimeout { timeout })
            }
            Err(RecvTimeoutError::Disconnected) => Err(CursorError::FetchTaskAborted(
                "runtime dropped the fetch waiter".to_string(),
            )),
        }
    }

    /// Take the next row, blocking on a page fetch when the queue runs dry.
    ///
    /// `Ok(None)` means the result is finished.
    pub fn next_row(&self) -> Result<Option<Row>, CursorError> {
        let Some(queue) = &self.inner.queue else {
            return Ok(None);
        };
        loop {
            if let Some(row) = queue.pop() {
                return Ok(Some(row));
            }
            if self.is_fully_fetched() {
                // A fetch may have landed between the pop and the check
                return Ok(queue.pop());
            }
            self.wait_for(self.inner.begin_fetch(Demand::Drained))?;
        }
    }

    /// Async counterpart of [`RowSet::next_row`].
    pub async fn next_row_async(&self) -> Result<Option<Row>, CursorError> {
        let Some(queue) = &self.inner.queue else {
            return Ok(None);
        };
        loop {
            if let Some(row) = queue.pop() {
                return Ok(Some(row));
            }
            if self.is_fully_fetched() {
                return Ok(queue.pop());
            }
            self.inner.begin_fetch(Demand::Drained).await?;
        }
    }

    /// Blocking iterator over the remaining rows.
    pub fn rows(&self) -> Rows<'_> {
        Rows::new(self)
    }

    /// The remaining rows as a stream. Ends after the first error.
    pub fn stream(&self) -> impl Stream<Item = Result<Row, CursorError>> + Send + use<> {
        stream::unfold(Some(self.clone()), |rowset| async move {
            let rowset = rowset?;
            match rowset.next_row_async().await {
                Ok(Some(row)) => Some((Ok(row), Some(rowset))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub fn stats(&self) -> PagingStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Inner {
    fn wants_more_pages(&self) -> bool {
        self.auto_page.load(Ordering::Acquire) && self.paging_state.load().is_some()
    }

    fn begin_fetch(self: &Arc<Self>, demand: Demand) -> FetchHandle {
        let publisher = loop {
            if !self.wants_more_pages() {
                return FetchHandle::settled(Ok(()));
            }
            match self.latch.claim() {
                Claim::Leader(publisher) => break publisher,
                Claim::Follower(fetch) => {
                    self.stats.record_join();
                    trace!("Joining in-flight page fetch");
                    return FetchHandle::in_flight(fetch);
                }
                // Raced past a fetch whose outcome we never saw, so look again
                Claim::Settled => continue,
            }
        };

        // Another consumer's fetch may have refilled the queue meanwhile
        if demand == Demand::Drained && self.queue.as_ref().is_some_and(|q| q.len() > 0) {
            trace!("Rows arrived while claiming the fetch, skipping it");
            return FetchHandle::settled(Ok(()));
        }
        // The fetch that just finished may have consumed the last paging state
        let Some(paging_state) = self.paging_state.load_full() else {
            return FetchHandle::settled(Ok(()));
        };
        let Some(fetcher) = self.fetcher.get() else {
            return FetchHandle::settled(Err(CursorError::MissingPageSource));
        };

        let (tx, rx) = oneshot::channel();
        let fetch = rx
            .map(|received| {
                received.unwrap_or_else(|_| {
                    Err(CursorError::FetchTaskAborted(
                        "fetch task ended without a result".to_string(),
                    ))
                })
            })
            .boxed()
            .shared();
        // Published before spawning: a task dropped on the spot releases the latch right away
        publisher.publish(fetch.clone());

        let release = ReleaseOnDrop(Arc::clone(&self.latch));
        let inner = Arc::clone(self);
        let source = Arc::clone(&fetcher.source);
        let span = debug_span!("page_fetch", paging_state = ?paging_state);
        fetcher.runtime.spawn(
            async move {
                let page = source.fetch_page(PagingState::clone(&paging_state)).await;
                let result = inner.merge(page);
                // Waiters woken by the send must find the latch idle
                drop(release);
                let _ = tx.send(result);
            }
            .instrument(span),
        );

        FetchHandle::in_flight(fetch)
    }

    /// Append a fetched page after the queued rows, then adopt its paging state.
    fn merge(&self, page: Result<Page, PageSourceError>) -> Result<(), CursorError> {
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                self.stats.record_failure();
                warn!(error = %e, "Page source failed");
                return Err(CursorError::from(e));
            }
        };

        let has_more = page.has_more();
        let Page { rows, paging_state } = page;
        let row_count = rows.len();
        let bytes = rows.iter().map(Row::size_bytes).sum();
        if let Some(queue) = &self.queue {
            queue.extend(rows);
        }
        self.paging_state.store(paging_state.map(Arc::new));
        self.stats.record_page(row_count, bytes);
        debug!(rows = row_count, has_more, "Merged fetched page");
        Ok(())
    }
}

impl std::fmt::Debug for RowSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSet")
            .field("void", &self.is_void())
            .field("available", &self.available_without_fetching())
            .field("paging_state", &self.paging_state())
            .field("auto_page", &self.auto_page())
            .field("fetch_in_flight", &self.inner.latch.is_in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PageSource, page_source_fn};
    use model::core::value::Value;
    use std::{
        sync::atomic::{AtomicUsize, Ordering::SeqCst},
        time::Duration,
    };
    use tokio::runtime::Handle;
    use tracing_test::traced_test;

    fn row(name: &str) -> Row {
        Row::new(vec![Value::from(name)])
    }

    fn names(rows: impl IntoIterator<Item = Result<Row, CursorError>>) -> Vec<String> {
        rows.into_iter()
            .map(|r| r.unwrap().get_value(0).as_str().unwrap().to_string())
            .collect()
    }

    fn token(raw: &'static [u8]) -> PagingState {
        PagingState::from(raw)
    }

    /// Answers every fetch with a final page of `names`, counting calls.
    fn last_page_source(
        calls: Arc<AtomicUsize>,
        names: &'static [&'static str],
    ) -> impl PageSource + 'static {
        page_source_fn(move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, SeqCst);
                Ok(Page::last(names.iter().map(|n| row(n)).collect()))
            }
        })
    }

    fn bound_row_set(source: impl PageSource + 'static, runtime: Handle) -> RowSet {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default())
            .with_paging_state(token(b"T1"));
        rowset
            .bind_page_source(PageFetcher::with_runtime(
                source,
                runtime,
                Duration::from_secs(5),
            ))
            .unwrap();
        rowset
    }

    #[test]
    fn test_void_row_set_is_empty_and_rejects_rows() {
        let rowset = RowSet::void(ExecutionInfo::default());

        assert!(rowset.is_void());
        assert!(rowset.is_fully_fetched());
        assert_eq!(rowset.available_without_fetching(), 0);
        assert!(rowset.is_exhausted().unwrap());
        assert!(rowset.rows().next().is_none());
        assert!(matches!(
            rowset.add_row(row("x")),
            Err(CursorError::VoidResult)
        ));
    }

    #[test]
    fn test_void_row_set_never_takes_a_paging_state() {
        let rowset = RowSet::void(ExecutionInfo::default()).with_paging_state(token(b"T1"));
        assert_eq!(rowset.paging_state(), None);
        assert!(rowset.is_fully_fetched());
    }

    #[test]
    fn test_new_row_set_defaults() {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default());

        assert!(!rowset.is_void());
        assert!(rowset.auto_page());
        assert_eq!(rowset.paging_state(), None);
        assert!(rowset.is_fully_fetched());
        assert!(rowset.is_exhausted().unwrap());
    }

    #[test]
    fn test_binding_twice_keeps_first_binding() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default());

        let first = page_source_fn(|_| async { Ok(Page::default()) });
        let second = page_source_fn(|_| async { Ok(Page::default()) });
        let handle = runtime.handle().clone();

        rowset
            .bind_page_source(PageFetcher::with_runtime(
                first,
                handle.clone(),
                Duration::from_millis(10),
            ))
            .unwrap();
        let err = rowset
            .bind_page_source(PageFetcher::with_runtime(
                second,
                handle,
                Duration::from_millis(99),
            ))
            .unwrap_err();

        assert!(matches!(err, CursorError::PageSourceAlreadyBound));
        let bound = rowset.inner.fetcher.get().unwrap();
        assert_eq!(bound.abort_timeout(), Duration::from_millis(10));
    }

    #[test]
    fn test_available_without_fetching_has_no_side_effects() {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default())
            .with_paging_state(token(b"T1"));
        rowset.add_row(row("a")).unwrap();
        rowset.add_row(row("b")).unwrap();

        assert_eq!(rowset.available_without_fetching(), 2);
        assert_eq!(rowset.available_without_fetching(), 2);
        assert!(!rowset.is_fully_fetched());
        assert_eq!(rowset.paging_state(), Some(token(b"T1")));
        assert_eq!(rowset.stats(), PagingStatsSnapshot::default());
    }

    #[test]
    fn test_auto_page_off_ignores_paging_state() {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default())
            .with_paging_state(token(b"T1"))
            .with_config(&PagingConfig::default().with_auto_page(false));
        rowset.add_row(row("X")).unwrap();
        rowset.add_row(row("Y")).unwrap();

        // No page source is bound, so any fetch attempt would fail
        assert_eq!(names(rowset.rows()), vec!["X", "Y"]);
        assert!(rowset.is_fully_fetched());
        assert!(rowset.is_exhausted().unwrap());
        assert_eq!(rowset.paging_state(), Some(token(b"T1")));
    }

    #[test]
    fn test_paging_state_without_source_is_fatal() {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default())
            .with_paging_state(token(b"T1"));
        rowset.add_row(row("A")).unwrap();

        let mut rows = rowset.rows();
        assert_eq!(names(rows.next()), vec!["A"]);
        assert!(matches!(
            rows.next(),
            Some(Err(CursorError::MissingPageSource))
        ));
        assert!(rows.next().is_none());

        // Nothing was claimed, so the next attempt fails the same way
        assert!(!rowset.inner.latch.is_in_flight());
        assert!(matches!(
            rowset.fetch_more_results(),
            Err(CursorError::MissingPageSource)
        ));
    }

    #[test]
    fn test_column_lookup() {
        use model::{core::data_type::DataType, execution::metadata::ColumnSpec};

        let metadata = ResultMetadata::new(vec![
            ColumnSpec::new("ks", "users", "id", DataType::Uuid),
            ColumnSpec::new("ks", "users", "email", DataType::Text),
        ]);
        let rowset = RowSet::new(metadata, ExecutionInfo::default());

        assert_eq!(rowset.columns().len(), 2);
        assert_eq!(rowset.column_index("EMAIL"), Some(1));
        assert_eq!(rowset.column_index("nope"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn test_fetch_logs_merged_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default())
            .with_paging_state(token(b"T1"));
        rowset
            .bind_page_source(
                PageFetcher::new(
                    last_page_source(calls.clone(), &["D", "E"]),
                    &PagingConfig::default(),
                )
                .unwrap(),
            )
            .unwrap();

        rowset.fetch_more_results_async().await.unwrap();

        assert_eq!(calls.load(SeqCst), 1);
        assert_eq!(rowset.available_without_fetching(), 2);
        assert!(rowset.is_fully_fetched());
        assert!(rowset.fetch_more_results_async().is_settled());
        assert!(logs_contain("Merged fetched page"));
    }

    #[test]
    fn test_paging_state_is_fixed_once_shared_or_fetched() {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default());
        let other = rowset.clone();
        let rowset = rowset.with_paging_state(token(b"T1"));
        assert_eq!(rowset.paging_state(), None);
        drop(other);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let rowset = bound_row_set(
            last_page_source(calls.clone(), &["D"]),
            runtime.handle().clone(),
        );
        runtime.block_on(rowset.fetch_more_results_async()).unwrap();
        assert_eq!(rowset.paging_state(), None);

        // A paging state that ran out stays gone
        let rowset = rowset.with_paging_state(token(b"T2"));
        assert_eq!(rowset.paging_state(), None);
        assert!(rowset.is_fully_fetched());
        assert_eq!(calls.load(SeqCst), 1);
    }

    #[test]
    fn test_caller_racing_an_abandoned_claim_gets_a_real_outcome() {
        let rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default())
            .with_paging_state(token(b"T1"));

        let Claim::Leader(publisher) = rowset.inner.latch.claim() else {
            panic!("first claim should lead");
        };
        let racer = {
            let rowset = rowset.clone();
            std::thread::spawn(move || rowset.fetch_more_results())
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(publisher);

        // The racer claims again instead of assuming the abandoned fetch worked
        assert!(matches!(
            racer.join().unwrap(),
            Err(CursorError::MissingPageSource)
        ));
        assert!(!rowset.inner.latch.is_in_flight());
    }

    #[test]
    fn test_fetch_on_stopped_runtime_releases_latch() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        let calls = Arc::new(AtomicUsize::new(0));
        let rowset = bound_row_set(last_page_source(calls.clone(), &["D"]), handle);

        let err = futures::executor::block_on(rowset.fetch_more_results_async()).unwrap_err();
        assert!(matches!(err, CursorError::FetchTaskAborted(_)), "{err:?}");
        assert!(!rowset.inner.latch.is_in_flight());

        // Later callers start a fetch of their own rather than join the dead one
        assert!(matches!(
            rowset.fetch_more_results(),
            Err(CursorError::FetchTaskAborted(_))
        ));
        assert!(!rowset.inner.latch.is_in_flight());
        assert_eq!(rowset.paging_state(), Some(token(b"T1")));
        assert_eq!(calls.load(SeqCst), 0);
    }

    #[test]
    fn test_drained_consumer_skips_fetch_when_rows_arrived() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let rowset = bound_row_set(
            last_page_source(calls.clone(), &["Z"]),
            runtime.handle().clone(),
        );
        // Lands after the consumer saw an empty queue
        rowset.add_row(row("A")).unwrap();

        let handle = rowset.inner.begin_fetch(Demand::Drained);
        assert!(handle.is_settled());
        assert!(!rowset.inner.latch.is_in_flight());
        assert_eq!(calls.load(SeqCst), 0);

        // An explicit fetch still prefetches with rows on hand
        runtime
            .block_on(rowset.fetch_more_results_async())
            .unwrap();
        assert_eq!(calls.load(SeqCst), 1);
        assert_eq!(names(rowset.rows()), vec!["A", "Z"]);
        assert_eq!(rowset.stats().bytes_received, 1);
    }
}
