//! Token sources: the OAuth2 client-credentials exchange and fixed tokens

use crate::auth::{AccessToken, AuthError, TokenSource};
use crate::config::ApiConfig;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 client-credentials exchange against the ICD access management endpoint
pub struct ClientCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentials {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        }
    }

    pub fn from_config(client: Client, config: &ApiConfig) -> Self {
        Self::new(
            client,
            &config.token_url,
            &config.client_id,
            &config.client_secret,
            &config.scope,
        )
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Request {
                url: self.token_url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Authentication failed: HTTP {}", status.as_u16());
            return Err(AuthError::Rejected {
                url: self.token_url.clone(),
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(AuthError::Malformed("empty access_token".to_string()));
        }

        Ok(AccessToken::from_lifetime(
            body.access_token,
            body.expires_in,
            Utc::now(),
        ))
    }
}

/// A pre-issued token that never needs refreshing
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: Utc::now() + Duration::days(365),
        })
    }
}
