use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque continuation token returned alongside a page.
///
/// The encoding belongs to whoever produced it. "No more pages" is expressed
/// as `Option::<PagingState>::None`, never as an empty token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagingState(Bytes);

impl PagingState {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self
            .0
            .iter()
            .take(16)
            .fold(String::new(), |acc, byte: &u8| acc + &format!("{byte:02x}"));
        if self.0.len() > 16 {
            write!(f, "PagingState({hex}.. {} bytes)", self.0.len())
        } else {
            write!(f, "PagingState({hex})")
        }
    }
}

impl From<&'static [u8]> for PagingState {
    fn from(raw: &'static [u8]) -> Self {
        PagingState(Bytes::from_static(raw))
    }
}

impl From<Vec<u8>> for PagingState {
    fn from(raw: Vec<u8>) -> Self {
        PagingState(Bytes::from(raw))
    }
}
