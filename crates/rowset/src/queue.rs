use model::records::row::Row;
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// FIFO of decoded rows shared by every consumer of a row set.
#[derive(Debug, Default)]
pub(crate) struct RowQueue {
    rows: Mutex<VecDeque<Row>>,
}

impl RowQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, row: Row) {
        self.lock().push_back(row);
    }

    /// Append a page's rows after everything already queued, keeping their order.
    pub(crate) fn extend(&self, rows: Vec<Row>) {
        self.lock().extend(rows);
    }

    pub(crate) fn pop(&self) -> Option<Row> {
        self.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    // A panicking consumer cannot leave the deque half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Row>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
