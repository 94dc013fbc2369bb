use crate::{core::data_type::DataType, pagination::paging_state::PagingState};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// Describes one column of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSpec {
    pub fn new(keyspace: &str, table: &str, name: &str, data_type: DataType) -> Self {
        ColumnSpec {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            name: name.to_string(),
            data_type,
        }
    }
}

/// Column descriptors for a result set, in row value order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub columns: Vec<ColumnSpec>,
}

impl ResultMetadata {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        ResultMetadata { columns }
    }

    /// Position of a column by name, matched case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// What the driver knows about how the query was executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionInfo {
    pub queried_host: Option<SocketAddr>,
    pub trace_id: Option<Uuid>,
    pub warnings: Vec<String>,
    /// Token the originating request was sent with, if it resumed a result.
    pub paging_state: Option<PagingState>,
}

impl ExecutionInfo {
    pub fn new(queried_host: SocketAddr) -> Self {
        ExecutionInfo {
            queried_host: Some(queried_host),
            ..Default::default()
        }
    }

    pub fn with_paging_state(mut self, paging_state: PagingState) -> Self {
        self.paging_state = Some(paging_state);
        self
    }
}
