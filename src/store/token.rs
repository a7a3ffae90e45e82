// src/store/token.rs
//! OAuth2 access tokens for the Google APIs.
//!
//! The service-account flow signs an RS256 JWT assertion with the
//! credential's private key and exchanges it at the credential's token URI
//! (JWT-bearer grant). Tokens are cached until shortly before expiry.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use super::StoreError;
use crate::credentials::Credential;

pub const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh this long before the reported expiry.
const EXPIRY_SLACK_SECS: u64 = 60;

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, StoreError>;
}

/// Fixed bearer token; handy for tests and pre-minted tokens.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, StoreError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

struct CachedToken {
    token: SecretString,
    expires_at: u64,
}

/// Service-account token source.
pub struct ServiceAccountTokenSource {
    credential: Credential,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(credential: Credential, http: reqwest::Client) -> Self {
        Self {
            credential,
            http,
            cache: Mutex::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Build the signed assertion for `now` (unix seconds).
    pub fn assertion(&self, now: u64) -> Result<String, StoreError> {
        let claims = AssertionClaims {
            iss: self.credential.client_email.clone(),
            scope: SCOPES.to_string(),
            aud: self.credential.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.credential.private_key_pem().as_bytes())
            .map_err(|e| StoreError::Auth(format!("private key: {e}")))?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.credential.private_key_id.clone();
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| StoreError::Auth(format!("signing assertion: {e}")))
    }

    async fn exchange(&self, now: u64) -> Result<CachedToken, StoreError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: Option<u64>,
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.credential.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Auth(format!("token request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("token response: {e}")))?;
        let ttl = payload.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        tracing::debug!(ttl_secs = ttl, "minted access token");
        Ok(CachedToken {
            token: SecretString::from(payload.access_token),
            expires_at: now + ttl,
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<SecretString, StoreError> {
        let now = unix_now();
        let mut cache = self.cache.lock().await;
        if let Some(c) = cache.as_ref() {
            if now + EXPIRY_SLACK_SECS < c.expires_at {
                return Ok(c.token.clone());
            }
        }
        let fresh = self.exchange(now).await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

/// Expose a token for a header value.
pub(crate) fn bearer(token: &SecretString) -> &str {
    token.expose_secret()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
