//! Occupancy poller binary entrypoint.
//! Resolves credentials and destinations once, then runs one poll loop per
//! selected venue until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use occupancy_poller::config::sources::{self, load_sources_default, load_sources_from};
use occupancy_poller::config::Settings;
use occupancy_poller::credentials;
use occupancy_poller::fetch::{Fetcher, HttpFetcher};
use occupancy_poller::poller::scheduler;
use occupancy_poller::store::{GoogleSheetsStore, InMemoryStore, LogStore};

#[derive(Parser, Debug)]
#[command(name = "occupancy-poller")]
#[command(about = "Poll venue occupancy and append readings to a Google Sheets log")]
struct Args {
    /// Venue to poll (repeatable). Defaults to every configured venue.
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Sources file (TOML or JSON). Overrides POLLER_SOURCES_PATH.
    #[arg(long = "sources", value_name = "PATH")]
    sources_path: Option<PathBuf>,

    /// Run a single tick per venue and exit.
    #[arg(long)]
    once: bool,

    /// Keep readings in memory instead of writing to Google Sheets.
    #[arg(long)]
    dry_run: bool,

    /// Print the configured venues and exit.
    #[arg(long)]
    list: bool,
}

/// Plain `fmt` logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("occupancy_poller=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    exit_status(run(args).await)
}

/// Logs a fatal error exactly once and maps it to a failing exit status.
fn exit_status(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::from_env().context("reading settings")?;

    let all = match &args.sources_path {
        Some(p) => load_sources_from(p)?,
        None => load_sources_default()?,
    };
    let selected = sources::select(all, &args.sources)?;

    if args.list {
        for s in &selected {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                s.name,
                s.extraction.label(),
                s.partition,
                s.interval_env,
                s.fetch_target
            );
        }
        return Ok(());
    }

    if let Some(addr) = settings.metrics_addr {
        occupancy_poller::metrics::install_exporter(addr)?;
    }

    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new(settings.fetch_timeout).context("building http client")?);

    let store: Arc<dyn LogStore> = if args.dry_run {
        tracing::warn!("dry run: readings are kept in memory only");
        Arc::new(InMemoryStore::new())
    } else {
        let credential = credentials::resolve(&settings.credentials)
            .context("resolving Google credentials")?;
        let http = reqwest::Client::builder()
            .timeout(settings.fetch_timeout)
            .build()
            .context("building store http client")?;
        Arc::new(GoogleSheetsStore::new(credential, http)?)
    };

    let loops = scheduler::init_loops(selected, &settings, fetcher, store).await?;

    if args.once {
        for (name, outcome) in scheduler::run_once(&loops).await {
            tracing::info!(source = %name, appended = outcome.is_appended(), "single tick done");
        }
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown requested, stopping after the current tick");
        let _ = tx.send(true);
    });

    let handles = scheduler::spawn_all(loops, rx);
    for (name, stats) in scheduler::join_all(handles).await {
        tracing::info!(source = %name, ticks = stats.ticks, appended = stats.appended, "loop finished");
    }
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_result_maps_to_exit_status() {
        assert_eq!(exit_status(Ok(())), ExitCode::SUCCESS);
        let err = anyhow::anyhow!("no credentials").context("resolving Google credentials");
        assert_eq!(exit_status(Err(err)), ExitCode::FAILURE);
    }

    #[test]
    fn cli_flags_parse() {
        let a = Args::parse_from(["occupancy-poller", "-s", "A", "--source", "B", "--once", "--dry-run"]);
        assert_eq!(a.sources, vec!["A", "B"]);
        assert!(a.once && a.dry_run && !a.list);
        assert!(a.sources_path.is_none());
    }
}
