//! Access token caching
//!
//! Tokens are cached until shortly before they expire. The cache lock is
//! held across the refresh, so concurrent callers wait for the one
//! in-flight exchange instead of starting their own.

use crate::auth::{AuthError, TokenProvider, TokenSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Seconds subtracted from the advertised lifetime of every token
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// A bearer token and the instant it stops being used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token from an `expires_in` lifetime, applying the expiry margin
    pub fn from_lifetime(token: impl Into<String>, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: now + Duration::seconds(expires_in_secs - EXPIRY_MARGIN_SECS),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Single-flight caching token provider
pub struct TokenCache<S> {
    source: S,
    cached: Mutex<Option<AccessToken>>,
    refreshes: AtomicU64,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Number of credential exchanges performed so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for TokenCache<S> {
    async fn get_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(Utc::now())) {
            return Ok(token.token.clone());
        }

        tracing::info!("Fetching new access token");
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        let token = self.source.fetch_token().await?;
        tracing::debug!("Access token valid until {}", token.expires_at);

        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate(&self, token: &str) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|t| t.token == token) {
            tracing::debug!("Dropping rejected access token");
            *cached = None;
        }
    }
}
