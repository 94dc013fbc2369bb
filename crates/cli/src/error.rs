use rowset::{ConfigError, CursorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the configuration file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("Failed to deserialize the configuration file: {0}")]
    ConfigDeserialize(#[from] serde_json::Error),

    #[error("Invalid paging configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read rows: {0}")]
    Cursor(#[from] CursorError),

    #[error("Page size must be at least 1")]
    InvalidPageSize,

    #[error("Consumer task failed: {0}")]
    Consumer(#[from] tokio::task::JoinError),
}
