use crate::{pagination::paging_state::PagingState, records::row::Row};

/// One page of rows plus the token to resume after it.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub rows: Vec<Row>,
    /// `None` when this was the last page.
    pub paging_state: Option<PagingState>,
}

impl Page {
    pub fn new(rows: Vec<Row>, paging_state: Option<PagingState>) -> Self {
        Page { rows, paging_state }
    }

    /// A final page with no continuation.
    pub fn last(rows: Vec<Row>) -> Self {
        Page {
            rows,
            paging_state: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_more(&self) -> bool {
        self.paging_state.is_some()
    }
}
