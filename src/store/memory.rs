// src/store/memory.rs
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{LogStore, PartitionHandle, Reading, StoreError, HEADER_ROW};

type Row = Vec<String>;

/// Process-local log store. Backs `--dry-run` and the tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    logs: Mutex<BTreeMap<String, BTreeMap<String, Vec<Row>>>>,
    fail_appends: Mutex<u32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends fail with a transient error.
    pub fn fail_next_appends(&self, n: u32) {
        *self.fail_appends.lock().expect("store mutex poisoned") = n;
    }

    /// All rows of a partition, header included.
    pub fn rows(&self, log_name: &str, partition: &str) -> Vec<Row> {
        let logs = self.logs.lock().expect("store mutex poisoned");
        logs.get(log_name)
            .and_then(|l| l.get(partition))
            .cloned()
            .unwrap_or_default()
    }

    /// Data rows only.
    pub fn readings(&self, log_name: &str, partition: &str) -> Vec<Row> {
        self.rows(log_name, partition).into_iter().skip(1).collect()
    }

    pub fn partitions(&self, log_name: &str) -> Vec<String> {
        let logs = self.logs.lock().expect("store mutex poisoned");
        logs.get(log_name)
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogStore for InMemoryStore {
    async fn resolve_partition(
        &self,
        log_name: &str,
        partition: &str,
    ) -> Result<PartitionHandle, StoreError> {
        let mut logs = self.logs.lock().expect("store mutex poisoned");
        let log = logs.entry(log_name.to_string()).or_default();
        log.entry(partition.to_string())
            .or_insert_with(|| vec![HEADER_ROW.iter().map(|h| h.to_string()).collect()]);
        Ok(PartitionHandle {
            log_name: log_name.to_string(),
            log_id: format!("memory:{log_name}"),
            partition: partition.to_string(),
        })
    }

    async fn append(&self, handle: &PartitionHandle, reading: &Reading) -> Result<(), StoreError> {
        {
            let mut fail = self.fail_appends.lock().expect("store mutex poisoned");
            if *fail > 0 {
                *fail -= 1;
                return Err(StoreError::Http {
                    status: Some(503),
                    message: "injected failure".to_string(),
                });
            }
        }

        let mut logs = self.logs.lock().expect("store mutex poisoned");
        let rows = logs
            .get_mut(&handle.log_name)
            .and_then(|l| l.get_mut(&handle.partition))
            .ok_or_else(|| {
                StoreError::Config(format!(
                    "partition {}/{} was never resolved",
                    handle.log_name, handle.partition
                ))
            })?;
        rows.push(vec![reading.timestamp_string(), reading.value.to_string()]);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(v: u64) -> Reading {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        Reading::new(at, chrono_tz::Europe::Zurich, v)
    }

    #[tokio::test]
    async fn resolve_creates_header_once() {
        let store = InMemoryStore::new();
        let h = store.resolve_partition("Log", "A").await.unwrap();
        store.append(&h, &reading(5)).await.unwrap();
        // Resolving again must not add a second header or drop rows.
        store.resolve_partition("Log", "A").await.unwrap();
        let rows = store.rows("Log", "A");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["Timestamp", "Occupancy"]);
        assert_eq!(rows[1], vec!["2025-03-01 09:00:00", "5"]);
    }

    #[tokio::test]
    async fn injected_failures_leave_rows_untouched() {
        let store = InMemoryStore::new();
        let h = store.resolve_partition("Log", "A").await.unwrap();
        store.fail_next_appends(1);
        assert!(store.append(&h, &reading(1)).await.is_err());
        assert!(store.append(&h, &reading(2)).await.is_ok());
        assert_eq!(store.readings("Log", "A").len(), 1);
    }

    #[tokio::test]
    async fn unresolved_partition_is_rejected() {
        let store = InMemoryStore::new();
        let h = PartitionHandle {
            log_name: "Log".into(),
            log_id: "x".into(),
            partition: "nope".into(),
        };
        assert!(matches!(
            store.append(&h, &reading(1)).await,
            Err(StoreError::Config(_))
        ));
    }
}
