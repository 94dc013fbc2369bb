use crate::error::CliError;
use async_trait::async_trait;
use model::core::data_type::DataType;
use rowset::{
    ColumnSpec, CursorError, ExecutionInfo, Page, PageSource, PageSourceError, PagingState,
    ResultMetadata, Row, RowSet, Value,
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

const KEYSPACE: &str = "demo";
const TABLE: &str = "events";

/// An in-memory table served in pages, standing in for a database node.
///
/// Paging states are the offset of the next row as eight big-endian bytes.
pub struct SimulatedSource {
    total_rows: u64,
    page_size: u64,
    latency: Duration,
    requests: AtomicU64,
}

impl SimulatedSource {
    pub fn new(total_rows: u64, page_size: u64, latency: Duration) -> Result<Self, CliError> {
        if page_size == 0 {
            return Err(CliError::InvalidPageSize);
        }
        Ok(Self {
            total_rows,
            page_size,
            latency,
            requests: AtomicU64::new(0),
        })
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn metadata() -> ResultMetadata {
        ResultMetadata::new(vec![
            ColumnSpec::new(KEYSPACE, TABLE, "id", DataType::BigInt),
            ColumnSpec::new(KEYSPACE, TABLE, "label", DataType::Text),
        ])
    }

    /// Run the query from `paging_state` (or the start), returning one page
    /// as a row set the way a driver hands back a response.
    pub fn execute(&self, paging_state: Option<PagingState>) -> Result<RowSet, CliError> {
        let offset = match &paging_state {
            Some(state) => decode_offset(state).map_err(CursorError::from)?,
            None => 0,
        };
        self.requests.fetch_add(1, Ordering::Relaxed);

        let mut info = ExecutionInfo::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 9042)));
        if let Some(state) = paging_state {
            info = info.with_paging_state(state);
        }

        let Page { rows, paging_state } = self.page_at(offset);
        let mut rowset = RowSet::new(Self::metadata(), info);
        if let Some(next) = paging_state {
            rowset = rowset.with_paging_state(next);
        }
        for row in rows {
            rowset.add_row(row)?;
        }
        Ok(rowset)
    }

    fn page_at(&self, offset: u64) -> Page {
        let end = offset.saturating_add(self.page_size).min(self.total_rows);
        let rows = (offset..end)
            .map(|id| {
                Row::new(vec![
                    Value::Int(id as i64),
                    Value::String(format!("event-{id}")),
                ])
            })
            .collect();
        let next = (end < self.total_rows).then(|| encode_offset(end));
        Page::new(rows, next)
    }
}

#[async_trait]
impl PageSource for SimulatedSource {
    async fn fetch_page(&self, paging_state: PagingState) -> Result<Page, PageSourceError> {
        let offset = decode_offset(&paging_state)?;
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let page = self.page_at(offset);
        debug!(offset, rows = page.row_count(), "Served simulated page");
        Ok(page)
    }
}

fn encode_offset(offset: u64) -> PagingState {
    PagingState::from(offset.to_be_bytes().to_vec())
}

fn decode_offset(state: &PagingState) -> Result<u64, PageSourceError> {
    let bytes: [u8; 8] = state
        .as_bytes()
        .try_into()
        .map_err(|_| format!("malformed paging state {state:?}"))?;
    Ok(u64::from_be_bytes(bytes))
}
