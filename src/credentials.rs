// src/credentials.rs
//! Service-account credential resolution.
//!
//! A local key file always wins over the environment secret. Resolution runs
//! once at startup and its failure is fatal.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::CredentialSettings;

pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_CREDENTIALS_ENV: &str = "GOOGLE_CREDENTIALS_JSON";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Where a credential came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    File(PathBuf),
    Env(String),
}

impl fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialOrigin::File(p) => write!(f, "file {}", p.display()),
            CredentialOrigin::Env(v) => write!(f, "env {v}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials found: {} does not exist and {env_var} is unset or empty", path.display())]
    Missing { path: PathBuf, env_var: String },

    #[error("malformed credentials from {origin}: {reason}")]
    Malformed {
        origin: CredentialOrigin,
        reason: String,
    },
}

impl CredentialError {
    pub fn is_missing(&self) -> bool {
        matches!(self, CredentialError::Missing { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CredentialError::Malformed { .. })
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct KeyFile {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    private_key_id: Option<String>,
}

/// Resolved service-account identity.
pub struct Credential {
    pub client_email: String,
    pub private_key: SecretString,
    pub token_uri: String,
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub origin: CredentialOrigin,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Parse a service-account key JSON document.
    pub fn from_json(json: &str, origin: CredentialOrigin) -> Result<Self, CredentialError> {
        let malformed = |reason: String| CredentialError::Malformed {
            origin: origin.clone(),
            reason,
        };
        let key: KeyFile = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
        if key.client_email.trim().is_empty() {
            return Err(malformed("client_email must not be empty".to_string()));
        }
        if key.private_key.trim().is_empty() {
            return Err(malformed("private_key must not be empty".to_string()));
        }
        Ok(Self {
            client_email: key.client_email,
            private_key: SecretString::from(key.private_key),
            token_uri: key.token_uri,
            project_id: key.project_id,
            private_key_id: key.private_key_id,
            origin,
        })
    }

    pub fn private_key_pem(&self) -> &str {
        self.private_key.expose_secret()
    }
}

/// Resolve using the configured file path and env var.
pub fn resolve(settings: &CredentialSettings) -> Result<Credential, CredentialError> {
    let env_value = std::env::var(&settings.env_var).ok();
    resolve_from(&settings.path, &settings.env_var, env_value.as_deref())
}

/// File first, then the env secret.
pub fn resolve_from(
    path: &Path,
    env_var: &str,
    env_value: Option<&str>,
) -> Result<Credential, CredentialError> {
    if path.exists() {
        tracing::info!(path = %path.display(), "loading local credentials file");
        let origin = CredentialOrigin::File(path.to_path_buf());
        return std::fs::read_to_string(path)
            .map_err(|e| CredentialError::Malformed {
                origin: origin.clone(),
                reason: e.to_string(),
            })
            .and_then(|content| Credential::from_json(&content, origin))
            .inspect(log_loaded)
            .inspect_err(|e| tracing::error!(path = %path.display(), error = %e, "credentials file is not a valid service-account key"));
    }

    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(json) => {
            tracing::info!(env = %env_var, len = json.len(), "loading credentials from environment secret");
            Credential::from_json(json, CredentialOrigin::Env(env_var.to_string()))
                .inspect(log_loaded)
                .inspect_err(|e| tracing::error!(error = %e, "environment secret is not a valid service-account key"))
        }
        None => {
            tracing::error!(env = %env_var, "credentials env var is unset or empty");
            Err(CredentialError::Missing {
                path: path.to_path_buf(),
                env_var: env_var.to_string(),
            })
        }
    }
}

fn log_loaded(c: &Credential) {
    tracing::info!(client_email = %c.client_email, origin = %c.origin, "credentials resolved");
}
