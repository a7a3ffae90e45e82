// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod credentials;
pub mod extract;
pub mod fetch;
pub mod interval;
pub mod metrics;
pub mod poller;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::{Settings, SourceDescriptor};
pub use crate::credentials::{Credential, CredentialError};
pub use crate::extract::{extract, ExtractionMethod, Extractor, NoValue};
pub use crate::fetch::{FetchError, Fetcher, HttpFetcher};
pub use crate::poller::{PollLoop, RunStats, TickOutcome};
pub use crate::store::{
    GoogleSheetsStore, InMemoryStore, LogStore, PartitionHandle, Reading, StoreError,
};
