//! Paged query results.
//!
//! A [`RowSet`] holds the rows of one query result. Rows are consumed
//! destructively and may be drained by several consumers at once. When the
//! rows on hand run out and the server handed back a paging state, the row
//! set asks its bound [`PageSource`] for the next page, making sure only one
//! such request is ever in flight.

pub mod config;
pub mod error;
pub mod handle;
mod latch;
mod queue;
pub mod rows;
pub mod rowset;
pub mod source;
pub mod stats;

pub use config::PagingConfig;
pub use error::{ConfigError, CursorError, PageSourceError};
pub use handle::FetchHandle;
pub use rows::Rows;
pub use rowset::RowSet;
pub use source::{FnPageSource, PageFetcher, PageSource, page_source_fn};
pub use stats::PagingStatsSnapshot;

pub use model::{
    core::value::Value,
    execution::metadata::{ColumnSpec, ExecutionInfo, ResultMetadata},
    pagination::{page::Page, paging_state::PagingState},
    records::row::Row,
};
