#![allow(dead_code)]

use async_trait::async_trait;
use rowset::{
    ExecutionInfo, Page, PageSource, PageSourceError, PagingState, ResultMetadata, Row, RowSet,
    Value,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;

pub fn row(name: &str) -> Row {
    Row::new(vec![Value::from(name)])
}

pub fn name_of(row: &Row) -> String {
    row.get_value(0).as_str().unwrap().to_string()
}

pub fn names(rows: impl IntoIterator<Item = Row>) -> Vec<String> {
    rows.into_iter().map(|r| name_of(&r)).collect()
}

/// Token pointing at page `index` of a [`PagedSource`].
pub fn token(index: usize) -> PagingState {
    PagingState::from((index as u32).to_be_bytes().to_vec())
}

fn page_index(state: &PagingState) -> usize {
    let bytes: [u8; 4] = state.as_bytes().try_into().unwrap();
    u32::from_be_bytes(bytes) as usize
}

/// Serves pre-built pages and records every call made to it.
pub struct PagedSource {
    pages: Vec<Vec<Row>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<PagingState>>,
    latency: Duration,
    gate: Option<Arc<Notify>>,
    fail_first: AtomicUsize,
}

impl PagedSource {
    pub fn new(pages: Vec<Vec<Row>>) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            gate: None,
            fail_first: AtomicUsize::new(0),
        }
    }

    pub fn named(pages: &[&[&str]]) -> Self {
        Self::new(
            pages
                .iter()
                .map(|page| page.iter().map(|n| row(n)).collect())
                .collect(),
        )
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every fetch waits for one `notify_one` on the gate before answering.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Fail the first `n` fetches.
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PagingState> {
        self.seen.lock().unwrap().clone()
    }

    /// A row set holding the first page, with a paging state for the rest.
    pub fn row_set(&self) -> RowSet {
        let mut rowset = RowSet::new(ResultMetadata::default(), ExecutionInfo::default());
        if self.pages.len() > 1 {
            rowset = rowset.with_paging_state(token(1));
        }
        for row in self.pages.first().cloned().unwrap_or_default() {
            rowset.add_row(row).unwrap();
        }
        rowset
    }
}

#[async_trait]
impl PageSource for PagedSource {
    async fn fetch_page(&self, paging_state: PagingState) -> Result<Page, PageSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(paging_state.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err("node unavailable".into());
        }

        let index = page_index(&paging_state);
        let next = (index + 1 < self.pages.len()).then(|| token(index + 1));
        Ok(Page::new(self.pages[index].clone(), next))
    }
}

pub fn multi_thread_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}
