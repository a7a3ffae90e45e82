// src/poller/scheduler.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{PollLoop, RunStats, TickOutcome};
use crate::config::{Settings, SourceDescriptor};
use crate::fetch::Fetcher;
use crate::store::LogStore;

/// Init every source's destination. Any failure aborts startup.
pub async fn init_loops(
    sources: Vec<SourceDescriptor>,
    settings: &Settings,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn LogStore>,
) -> Result<Vec<PollLoop>> {
    crate::metrics::ensure_metrics_described();
    let mut loops = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source.name.clone();
        let partition = source.partition.clone();
        let l = PollLoop::init(source, settings, fetcher.clone(), store.clone())
            .await
            .with_context(|| {
                format!(
                    "resolving destination {}/{} for source {}",
                    settings.log_name, partition, name
                )
            })?;
        loops.push(l);
    }
    Ok(loops)
}

/// Spawn one independent task per loop.
pub fn spawn_all(
    loops: Vec<PollLoop>,
    shutdown: watch::Receiver<bool>,
) -> Vec<(String, JoinHandle<RunStats>)> {
    loops
        .into_iter()
        .map(|l| {
            let name = l.source().name.clone();
            let rx = shutdown.clone();
            let handle = tokio::spawn(async move { l.run(rx).await });
            (name, handle)
        })
        .collect()
}

/// Single pass over all loops, in order.
pub async fn run_once(loops: &[PollLoop]) -> Vec<(String, TickOutcome)> {
    let mut out = Vec::with_capacity(loops.len());
    for l in loops {
        let outcome = l.tick().await;
        out.push((l.source().name.clone(), outcome));
    }
    out
}

/// Wait for all spawned loops; a panicked task is logged, not propagated.
pub async fn join_all(handles: Vec<(String, JoinHandle<RunStats>)>) -> Vec<(String, RunStats)> {
    let mut out = Vec::with_capacity(handles.len());
    for (name, h) in handles {
        match h.await {
            Ok(stats) => out.push((name, stats)),
            Err(e) => tracing::error!(source = %name, error = %e, "poll task ended abnormally"),
        }
    }
    out
}
