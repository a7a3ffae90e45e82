// src/store/mod.rs
//! Destination log: one append-only table per venue inside a named log.

pub mod memory;
pub mod sheets;
pub mod token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

pub use memory::InMemoryStore;
pub use sheets::GoogleSheetsStore;

/// Header row written when a partition is created.
pub const HEADER_ROW: [&str; 2] = ["Timestamp", "Occupancy"];

/// Rendering used for the timestamp column (interpreted by the sheet as a date).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One timestamped occupancy sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub timestamp: DateTime<Tz>,
    pub value: u64,
}

impl Reading {
    pub fn new(at: DateTime<Utc>, tz: Tz, value: u64) -> Self {
        Self {
            timestamp: at.with_timezone(&tz),
            value,
        }
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Resolved append target; acquired once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    pub log_name: String,
    /// Backend identifier of the log (spreadsheet id).
    pub log_id: String,
    pub partition: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("store request failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Http {
        status: Option<u16>,
        message: String,
    },

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("store misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Http {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

/// Open-or-create and append contract of the destination log.
///
/// Implementations never retry; retry policy belongs to the caller.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn resolve_partition(
        &self,
        log_name: &str,
        partition: &str,
    ) -> Result<PartitionHandle, StoreError>;

    async fn append(&self, handle: &PartitionHandle, reading: &Reading) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}
