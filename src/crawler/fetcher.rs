//! HTTP fetcher implementation
//!
//! This module handles all entity requests for the harvester, including:
//! - Building the HTTP client
//! - Attaching the bearer token and API headers
//! - Retry with exponential backoff for transient failures
//! - Error classification into per-URL and run-aborting failures

use crate::auth::{AuthError, TokenProvider};
use crate::config::{ApiConfig, CrawlerConfig};
use crate::model::Entity;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Terminal outcome of fetching one URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} was rejected with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Failed to decode entity from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Authorization rejected for {url} with HTTP {status}")]
    Unauthorized { url: String, status: u16 },

    #[error("Could not obtain an access token: {0}")]
    Auth(#[from] AuthError),

    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchError {
    /// Authentication failures abort the whole run; everything else only
    /// abandons the one URL
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Auth(_))
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Delay after the failed `attempt` (1-based) before the next one
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }

    /// Every delay of a fully failing fetch, in order
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.backoff_for(a)).collect()
    }
}

/// Why a single attempt failed
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    Unauthorized(u16),
    Auth(AuthError),
    Terminal(FetchError),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "{}", message),
            Self::Unauthorized(status) => write!(f, "HTTP {}", status),
            Self::Auth(e) => write!(f, "{}", e),
            Self::Terminal(e) => write!(f, "{}", e),
        }
    }
}

/// Builds an HTTP client for the entity API
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.request_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches entities with authentication and retries
pub struct Fetcher {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    policy: RetryPolicy,
    language: String,
    api_version: String,
}

impl Fetcher {
    pub fn new(
        client: Client,
        tokens: Arc<dyn TokenProvider>,
        policy: RetryPolicy,
        api: &ApiConfig,
    ) -> Self {
        Self {
            client,
            tokens,
            policy,
            language: api.language.clone(),
            api_version: api.api_version.clone(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches one entity
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout, connection error | Retry with backoff |
    /// | HTTP 5xx, HTTP 429 | Retry with backoff |
    /// | HTTP 401/403 | Drop the token, retry; fatal once attempts run out |
    /// | Token endpoint failure | Retry; fatal once attempts run out |
    /// | HTTP 404, other 4xx | Immediate `Rejected` |
    /// | Undecodable body | Immediate `Decode` |
    pub async fn fetch(&self, url: &str) -> Result<Entity, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match self.attempt(url).await {
                Ok(entity) => return Ok(entity),
                Err(AttemptError::Terminal(e)) => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::warn!("Attempt {}/{} for {} failed: {}", attempt, max_attempts, url, error);
                return Err(match error {
                    AttemptError::Unauthorized(status) => FetchError::Unauthorized {
                        url: url.to_string(),
                        status,
                    },
                    AttemptError::Auth(e) => FetchError::Auth(e),
                    other => FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last_error: other.to_string(),
                    },
                });
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempt,
                max_attempts,
                url,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, url: &str) -> Result<Entity, AttemptError> {
        let token = self.tokens.get_token().await.map_err(AttemptError::Auth)?;

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, &self.language)
            .header("API-Version", &self.api_version)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Transient("Request timeout".to_string())
                } else if e.is_connect() {
                    AttemptError::Transient(format!("Connection failed: {}", e))
                } else {
                    AttemptError::Transient(e.to_string())
                }
            })?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.tokens.invalidate(&token).await;
            return Err(AttemptError::Unauthorized(status.as_u16()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AttemptError::Transient(format!("HTTP {}", status.as_u16())));
        }

        if !status.is_success() {
            return Err(AttemptError::Terminal(FetchError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Transient("Timeout reading body".to_string())
            } else {
                AttemptError::Transient(e.to_string())
            }
        })?;

        let mut entity: Entity = serde_json::from_str(&body).map_err(|e| {
            AttemptError::Terminal(FetchError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
        })?;

        entity.source_url = Some(url.to_string());
        Ok(entity)
    }
}
