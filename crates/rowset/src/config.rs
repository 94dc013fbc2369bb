use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const AUTO_PAGE_ENV: &str = "ROWSET_AUTO_PAGE";
pub const ABORT_TIMEOUT_ENV: &str = "ROWSET_ABORT_TIMEOUT_MS";

/// Paging behaviour of a row set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Fetch the next page automatically when the rows on hand run out
    pub auto_page: bool,

    /// How long a blocking fetch waits before giving up
    #[serde(rename = "abort_timeout_ms", with = "millis")]
    pub abort_timeout: Duration,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            auto_page: true,
            abort_timeout: Duration::from_secs(20),
        }
    }
}

impl PagingConfig {
    pub fn with_auto_page(mut self, auto_page: bool) -> Self {
        self.auto_page = auto_page;
        self
    }

    pub fn with_abort_timeout(mut self, timeout: Duration) -> Self {
        self.abort_timeout = timeout;
        self
    }

    /// Overlay `ROWSET_AUTO_PAGE` and `ROWSET_ABORT_TIMEOUT_MS` from the process environment.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.overlay(std::env::vars())
    }

    /// Overlay settings from `KEY=VALUE` pairs; unrelated keys are ignored.
    pub fn overlay<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                AUTO_PAGE_ENV => {
                    self.auto_page = parse_bool(value).ok_or_else(|| invalid(key, value))?;
                }
                ABORT_TIMEOUT_ENV => {
                    let ms = value.parse::<u64>().map_err(|_| invalid(key, value))?;
                    self.abort_timeout = Duration::from_millis(ms);
                }
                _ => {}
            }
        }
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
