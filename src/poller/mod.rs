// src/poller/mod.rs
//! The poll loop: fetch -> extract -> append -> sleep, forever, for one
//! source. A failed tick appends nothing and never breaks the schedule.

pub mod scheduler;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::{Settings, SourceDescriptor};
use crate::extract::{Extractor, NoValue};
use crate::fetch::{FetchError, Fetcher};
use crate::interval::{self, DEFAULT_INTERVAL_SECS};
use crate::store::{LogStore, PartitionHandle, Reading, StoreError};

/// Wall clock used to stamp readings.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    Appended(Reading),
    FetchFailed(FetchError),
    NoValue(NoValue),
    AppendFailed(StoreError),
}

impl TickOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, TickOutcome::Appended(_))
    }
}

/// Per-loop counters, returned when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub appended: u64,
    pub fetch_failed: u64,
    pub no_value: u64,
    pub append_failed: u64,
}

impl RunStats {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Appended(_) => self.appended += 1,
            TickOutcome::FetchFailed(_) => self.fetch_failed += 1,
            TickOutcome::NoValue(_) => self.no_value += 1,
            TickOutcome::AppendFailed(_) => self.append_failed += 1,
        }
    }
}

pub struct PollLoop {
    source: SourceDescriptor,
    handle: PartitionHandle,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn LogStore>,
    extractor: Extractor,
    tz: Tz,
    default_interval_secs: u64,
    clock: Arc<dyn Clock>,
}

impl PollLoop {
    pub fn new(
        source: SourceDescriptor,
        handle: PartitionHandle,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            source,
            handle,
            fetcher,
            store,
            extractor: Extractor::default(),
            tz: crate::config::settings::DEFAULT_TIMEZONE,
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    /// Init phase for one source: resolve (or create) its partition.
    /// Failure here is fatal to the caller.
    pub async fn init(
        source: SourceDescriptor,
        settings: &Settings,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn LogStore>,
    ) -> Result<Self, StoreError> {
        let handle = store
            .resolve_partition(&settings.log_name, &source.partition)
            .await?;
        tracing::info!(
            source = %source.name,
            log = %handle.log_name,
            partition = %handle.partition,
            store = store.name(),
            "destination resolved"
        );
        Ok(Self::new(source, handle, fetcher, store).with_settings(settings))
    }

    pub fn with_settings(self, settings: &Settings) -> Self {
        self.with_extractor(Extractor::new(settings.no_data_sentinel.clone()))
            .with_timezone(settings.timezone)
            .with_default_interval(settings.default_interval_secs)
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn with_default_interval(mut self, secs: u64) -> Self {
        self.default_interval_secs = secs;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn handle(&self) -> &PartitionHandle {
        &self.handle
    }

    /// One fetch -> extract -> append step. Never panics, never returns an error.
    pub async fn tick(&self) -> TickOutcome {
        let name = self.source.name.as_str();
        counter!("poll_ticks_total", "source" => name.to_string()).increment(1);
        tracing::info!(source = %name, url = %self.source.fetch_target, "fetching occupancy");

        let t0 = Instant::now();
        let raw = match self.fetcher.fetch(&self.source).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "fetch failed, skipping tick");
                counter!("poll_fetch_errors_total", "source" => name.to_string()).increment(1);
                return TickOutcome::FetchFailed(e);
            }
        };
        histogram!("poll_fetch_ms", "source" => name.to_string())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(source = %name, body = %preview(&raw), "response received");

        let value = match self.extractor.extract(&raw, &self.source.extraction) {
            Ok(v) => v,
            Err(nv) => {
                tracing::warn!(
                    source = %name,
                    method = self.source.extraction.label(),
                    reason = %nv,
                    "no value extracted, nothing stored"
                );
                counter!("poll_no_value_total", "source" => name.to_string()).increment(1);
                return TickOutcome::NoValue(nv);
            }
        };

        let reading = Reading::new(self.clock.now(), self.tz, value);
        match self.store.append(&self.handle, &reading).await {
            Ok(()) => {
                tracing::info!(
                    source = %name,
                    timestamp = %reading.timestamp_string(),
                    value = reading.value,
                    "reading stored"
                );
                counter!("poll_appends_total", "source" => name.to_string()).increment(1);
                gauge!("poll_last_value", "source" => name.to_string()).set(value as f64);
                gauge!("poll_last_success_ts", "source" => name.to_string())
                    .set(reading.timestamp.timestamp() as f64);
                TickOutcome::Appended(reading)
            }
            Err(e) => {
                tracing::error!(source = %name, error = %e, value, "append failed, reading dropped");
                counter!("poll_append_errors_total", "source" => name.to_string()).increment(1);
                TickOutcome::AppendFailed(e)
            }
        }
    }

    /// Poll until `shutdown` flips to `true`. The flag is checked at the top
    /// of every iteration and interrupts the sleep.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunStats {
        let mut stats = RunStats::default();
        tracing::info!(source = %self.source.name, "poll loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.tick().await;
            stats.record(&outcome);

            let secs = interval::resolve(&self.source, self.default_interval_secs);
            sleep_or_shutdown(&mut shutdown, Duration::from_secs(secs)).await;
        }
        tracing::info!(source = %self.source.name, ?stats, "poll loop stopped");
        stats
    }
}

async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, dur: Duration) {
    let sleep = tokio::time::sleep(dur);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone: no stop signal can arrive any more.
                    (&mut sleep).await;
                    return;
                }
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

fn preview(raw: &str) -> String {
    let mut s: String = raw.chars().take(100).collect();
    if raw.chars().nth(100).is_some() {
        s.push('…');
    }
    s
}
