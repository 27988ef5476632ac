//! Outbound side of the gateway: service-token acquisition and the
//! pass-through client for the API-management-fronted Banner backend.

mod token;

pub use token::ServiceTokenProvider;

use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::errors::AppError;

/// Result of a proxied upstream call, before response shaping.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Forwards authorized requests to the upstream backend with the gateway's
/// own service credential attached.
pub struct UpstreamClient {
    config: UpstreamConfig,
    tokens: Arc<ServiceTokenProvider>,
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(
        config: UpstreamConfig,
        tokens: Arc<ServiceTokenProvider>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            tokens,
            http,
        }
    }

    /// Proxies `method {base}/api/{route}?{query}`, forwarding the JSON body
    /// and, when present, the client's `X-Secret-Write` header verbatim.
    /// Retries exactly once with a fresh service token if the upstream
    /// answers 401.
    pub async fn forward(
        &self,
        method: &Method,
        route: &str,
        query: Option<&str>,
        body: Option<&Value>,
        secret_write: Option<&str>,
    ) -> Result<UpstreamResponse, AppError> {
        let mut url = format!("{}/api/{}", self.config.base_url, route);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let token = self.tokens.access_token().await?;
        let response = self
            .send(method, &url, &token, body, secret_write)
            .await?;

        if response.status == 401 {
            tracing::warn!(%route, "upstream rejected service token, refreshing once");
            let token = self.tokens.refresh().await?;
            return self.send(method, &url, &token, body, secret_write).await;
        }

        Ok(response)
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
        secret_write: Option<&str>,
    ) -> Result<UpstreamResponse, AppError> {
        // axum and reqwest ship different `http` major versions; bridge the
        // method by name.
        let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|_| AppError::bad_request(format!("unsupported method: {method}")))?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.config.subscription_key {
            request = request.header("Ocp-Apim-Subscription-Key", key);
        }
        if let Some(secret) = secret_write {
            request = request.header("X-Secret-Write", secret);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let raw = response.text().await?;

        // Upstream bodies are JSON almost always; anything else passes
        // through as a raw string.
        let body = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        };

        Ok(UpstreamResponse { status, body })
    }
}
