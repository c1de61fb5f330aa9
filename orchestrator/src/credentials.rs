//! Service credential lifecycle.
//!
//! [`CredentialManager`] caches one bearer token for the whole process and refreshes it when it
//! is missing or within [`REFRESH_BUFFER_SECS`] of expiring. Concurrent callers that find the token
//! stale share a single refresh future, so N waiters cause one call to the identity provider.
//! The state lock is only held to read or publish; nobody holds it across the network call.

use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Refresh this many seconds before the provider-reported expiry.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(REFRESH_BUFFER_SECS)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Identity provider able to mint a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;
}

type PendingRefresh = Shared<BoxFuture<'static, Result<AccessToken, AuthError>>>;

#[derive(Default)]
struct CredentialState {
    current: Option<AccessToken>,
    in_flight: Option<PendingRefresh>,
    refreshes: u64,
}

pub struct CredentialManager {
    source: Arc<dyn TokenSource>,
    state: Mutex<CredentialState>,
}

impl CredentialManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: Mutex::new(CredentialState::default()),
        }
    }

    /// Return a token that stays valid for at least [`REFRESH_BUFFER_SECS`].
    pub async fn get_valid_credential(&self) -> Result<AccessToken, AuthError> {
        let pending = {
            let mut state = self.lock();
            if let Some(token) = &state.current {
                if token.is_fresh_at(Utc::now()) {
                    return Ok(token.clone());
                }
                debug!(expires_at = %token.expires_at, "Cached credential is expiring, refreshing");
            }

            if let Some(pending) = state.in_flight.clone() {
                pending
            } else {
                let source = Arc::clone(&self.source);
                let pending = async move { source.fetch_token().await }.boxed().shared();
                state.in_flight = Some(pending.clone());
                state.refreshes += 1;
                crate::metrics::CREDENTIAL_REFRESHES.inc();
                pending
            }
        };

        let result = pending.clone().await;

        let mut state = self.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|current| current.ptr_eq(&pending))
        {
            state.in_flight = None;
            match &result {
                Ok(token) => {
                    info!(expires_at = %token.expires_at, "Credential refreshed");
                    state.current = Some(token.clone());
                }
                Err(e) => warn!(error = %e, "Credential refresh failed"),
            }
        }

        result
    }

    /// Number of refreshes started since construction.
    pub fn refresh_count(&self) -> u64 {
        self.lock().refreshes
    }

    /// Drop the cached credential; used at shutdown.
    pub fn discard(&self) {
        let mut state = self.lock();
        state.current = None;
        state.in_flight = None;
        info!("Cached credential discarded");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CredentialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Google service-account key, as downloaded from the console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        serde_json::from_str(raw).map_err(|e| AuthError::InvalidKey(e.to_string()))
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Exchanges a signed JWT assertion for an OAuth2 access token.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    encoding_key: jsonwebtoken::EncodingKey,
    scope: String,
    client: reqwest::Client,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Result<Self, AuthError> {
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key,
            encoding_key,
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            client,
        })
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        debug!(client_email = %self.key.client_email, "Exchanging service account assertion");
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange(format!("status {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("unreadable token response: {e}")))?;

        Ok(AccessToken::new(
            token.access_token,
            now + Duration::seconds(token.expires_in),
        ))
    }
}
