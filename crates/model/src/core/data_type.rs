use serde::{Deserialize, Serialize};

/// Column type tag carried by a column descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    BigInt,
    Float,
    Double,
    Boolean,
    Text,
    Uuid,
    Blob,
    Timestamp,
    Custom(String),
}
