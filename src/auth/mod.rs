//! Bearer token handling for the ICD API
//!
//! This module provides the credential exchange against the token endpoint
//! and a cache that refreshes the token at most once at a time.

mod cache;
mod source;

pub use cache::{AccessToken, TokenCache, EXPIRY_MARGIN_SECS};
pub use source::{ClientCredentials, StaticToken};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while obtaining a bearer token
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Token request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Token endpoint {url} rejected the credentials with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Performs one credential exchange
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;
}

/// Hands out a currently valid bearer token
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a valid token, refreshing it if the cached one expired
    async fn get_token(&self) -> Result<String, AuthError>;

    /// Drops `token` from the cache after the API rejected it
    ///
    /// A token that has already been replaced is left alone.
    async fn invalidate(&self, token: &str);
}
