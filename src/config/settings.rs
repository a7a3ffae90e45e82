// src/config/settings.rs
use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::{DEFAULT_CREDENTIALS_ENV, DEFAULT_CREDENTIALS_PATH};
use crate::extract::DEFAULT_NO_DATA_SENTINEL;
use crate::interval::{self, DEFAULT_INTERVAL_SECS};

pub const ENV_LOG_NAME: &str = "POLL_LOG_NAME";
pub const ENV_DEFAULT_INTERVAL: &str = "POLL_DEFAULT_INTERVAL_SECS";
pub const ENV_TIMEZONE: &str = "POLL_TIMEZONE";
pub const ENV_FETCH_TIMEOUT: &str = "POLL_FETCH_TIMEOUT_SECS";
pub const ENV_NO_DATA_SENTINEL: &str = "POLL_NO_DATA_SENTINEL";
pub const ENV_CREDENTIALS_PATH: &str = "GOOGLE_CREDENTIALS_PATH";
pub const ENV_METRICS_ADDR: &str = "METRICS_LISTEN_ADDR";

pub const DEFAULT_LOG_NAME: &str = "Fitnesspark Auslastung";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Zurich;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Where the service-account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSettings {
    pub path: PathBuf,
    pub env_var: String,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            env_var: DEFAULT_CREDENTIALS_ENV.to_string(),
        }
    }
}

/// Process-wide settings shared by every source.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_name: String,
    pub default_interval_secs: u64,
    pub timezone: Tz,
    pub fetch_timeout: Duration,
    pub no_data_sentinel: String,
    pub credentials: CredentialSettings,
    pub metrics_addr: Option<std::net::SocketAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_name: DEFAULT_LOG_NAME.to_string(),
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            timezone: DEFAULT_TIMEZONE,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            no_data_sentinel: DEFAULT_NO_DATA_SENTINEL.to_string(),
            credentials: CredentialSettings::default(),
            metrics_addr: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Settings::default();

        if let Some(v) = get(ENV_LOG_NAME) {
            s.log_name = v;
        }

        // Same parse/fallback/floor rules as the per-source override.
        s.default_interval_secs =
            interval::resolve_value(get(ENV_DEFAULT_INTERVAL).as_deref(), DEFAULT_INTERVAL_SECS);

        if let Some(v) = get(ENV_TIMEZONE) {
            s.timezone = v
                .parse::<Tz>()
                .map_err(|e| anyhow!("{ENV_TIMEZONE}={v:?}: {e}"))?;
        }

        if let Some(v) = get(ENV_FETCH_TIMEOUT) {
            let secs: u64 = v
                .parse()
                .with_context(|| format!("{ENV_FETCH_TIMEOUT}={v:?}"))?;
            s.fetch_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(v) = get(ENV_NO_DATA_SENTINEL) {
            s.no_data_sentinel = v;
        }

        if let Some(v) = get(ENV_CREDENTIALS_PATH) {
            s.credentials.path = PathBuf::from(v);
        }

        if let Some(v) = get(ENV_METRICS_ADDR) {
            s.metrics_addr = Some(
                v.parse()
                    .with_context(|| format!("{ENV_METRICS_ADDR}={v:?}"))?,
            );
        }

        Ok(s)
    }
}
