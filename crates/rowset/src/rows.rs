use crate::{error::CursorError, rowset::RowSet};
use model::records::row::Row;

/// Blocking iterator over the rows of a [`RowSet`].
///
/// Each row handed out is removed from the row set, so iterators on several
/// threads split the rows between them. Fetches the next page whenever the
/// rows on hand run out. Stops after the first error.
pub struct Rows<'a> {
    rowset: &'a RowSet,
    failed: bool,
}

impl<'a> Rows<'a> {
    pub(crate) fn new(rowset: &'a RowSet) -> Self {
        Self {
            rowset,
            failed: false,
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row, CursorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.rowset.next_row() {
            Ok(row) => row.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = Result<Row, CursorError>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Rows::new(self)
    }
}
