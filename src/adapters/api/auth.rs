//! Upstream Authentication - OAuth2 Client Credentials
//!
//! Negotiates short-lived access tokens from the OAuth2 token endpoint
//! using HTTP basic auth and `grant_type=client_credentials`. Tokens are
//! cached until shortly before they expire, so callers just ask for a
//! token before each batch and rotation stays invisible to them.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::types::TokenResponse;
use crate::domain::error::{PipelineError, Result};

/// Tokens are refreshed this long before their reported expiry.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth2 client id and secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client-credentials token provider.
pub struct ClientCredentialsAuth {
    /// HTTP client used for token requests.
    http: Client,
    /// Token endpoint.
    oauth_url: String,
    /// Client id and secret (the secret never leaves the token request).
    credentials: ClientCredentials,
    /// Current token, if any.
    token: RwLock<Option<CachedToken>>,
}

impl ClientCredentialsAuth {
    pub fn new(http: Client, oauth_url: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            http,
            oauth_url: oauth_url.into(),
            credentials,
            token: RwLock::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// A valid access token, negotiating a new one when needed.
    pub async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.negotiate().await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call negotiates a new one.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    #[instrument(skip(self), fields(client_id = %self.credentials.client_id))]
    async fn negotiate(&self) -> Result<CachedToken> {
        let response = self
            .http
            .post(&self.oauth_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::UpstreamRefused {
                status: status.as_u16(),
                url: self.oauth_url.clone(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UpstreamParse(e.to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        info!(expires_in = body.expires_in, "Negotiated upstream access token");

        Ok(CachedToken {
            value: body.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ClientCredentials {
            client_id: "abc".to_string(),
            client_secret: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("abc"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint() {
        let auth = ClientCredentialsAuth::new(
            Client::new(),
            "http://127.0.0.1:1/oauth/token",
            ClientCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        );
        let err = auth.token().await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnreachable(_)));
    }
}
