use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::UpstreamConfig;
use crate::errors::AppError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Acquires and caches the client-credentials access token the gateway uses
/// for its own calls to the upstream backend. One token per process,
/// refreshed when it nears expiry or when an upstream 401 forces it.
pub struct ServiceTokenProvider {
    config: UpstreamConfig,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceTokenProvider {
    pub fn new(config: UpstreamConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            cached: RwLock::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, AppError> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh().await
    }

    /// Forces a new token. Called on startup-expired cache and after an
    /// upstream 401 (single retry, no backoff).
    pub async fn refresh(&self) -> Result<String, AppError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| {
                AppError::unavailable(format!("service token acquisition failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "token endpoint rejected client credentials");
            return Err(AppError::unavailable(format!(
                "token endpoint responded with status {status}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| AppError::unavailable(format!("malformed token response: {err}")))?;

        // Refresh a minute early so in-flight requests never carry a token
        // that expires mid-call.
        let expires_at = Utc::now() + Duration::seconds((token.expires_in - 60).max(0));
        let mut cached = self.cached.write().await;
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}
