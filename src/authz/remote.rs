use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{modules, PermissionDirectory, PermissionLevel, UserPermissionRecord};
use crate::errors::AppError;
use crate::models::role::Role;
use crate::models::user::{User, UserStatus};
use crate::upstream::ServiceTokenProvider;

/// Directory backed by the upstream backend's user-profile endpoint,
/// reached with the gateway's client-credentials token.
pub struct RemoteDirectory {
    base_url: String,
    subscription_key: Option<String>,
    tokens: Arc<ServiceTokenProvider>,
    http: reqwest::Client,
}

impl RemoteDirectory {
    pub fn new(
        base_url: String,
        subscription_key: Option<String>,
        tokens: Arc<ServiceTokenProvider>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url,
            subscription_key,
            tokens,
            http,
        }
    }

    async fn fetch_profile(&self, email: &str, token: &str) -> Result<reqwest::Response, AppError> {
        let url = format!("{}/api/auth/user-profile", self.base_url);
        let mut request = self
            .http
            .get(&url)
            .query(&[("email", email)])
            .bearer_auth(token)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.subscription_key {
            request = request.header("Ocp-Apim-Subscription-Key", key);
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl PermissionDirectory for RemoteDirectory {
    async fn lookup(&self, email: &str) -> Result<Option<UserPermissionRecord>, AppError> {
        let token = self.tokens.access_token().await?;
        let mut response = self.fetch_profile(email, &token).await?;

        // One token-refresh retry on 401, mirroring the proxy client.
        if response.status().as_u16() == 401 {
            let token = self.tokens.refresh().await?;
            response = self.fetch_profile(email, &token).await?;
        }

        match response.status().as_u16() {
            404 => return Ok(None),
            status if !(200..300).contains(&status) => {
                tracing::error!(%status, "user-profile endpoint failed");
                return Err(AppError::unavailable(format!(
                    "permission directory responded with status {status}"
                )));
            }
            _ => {}
        }

        let profile: RemoteProfile = response.json().await.map_err(|err| {
            AppError::unavailable(format!("malformed user-profile response: {err}"))
        })?;

        Ok(Some(transform_profile(profile)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteProfile {
    #[serde(default)]
    user_id: Value,
    email: Option<String>,
    display_name: Option<String>,
    status: Option<String>,
    last_access_at: Option<DateTime<Utc>>,
    user_created_at: Option<DateTime<Utc>>,
    role: Option<RemoteRole>,
    #[serde(default)]
    modules: Vec<RemoteModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteRole {
    #[serde(default)]
    role_id: Value,
    role_name: Option<String>,
    role_description: Option<String>,
    #[serde(default)]
    is_system_role: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteModule {
    module_code: String,
    #[serde(default)]
    permissions: Vec<String>,
}

/// Upstream module codes to the codes the frontend knows; unrecognized
/// codes pass through (lowercased) unchanged.
fn remap_module_code(code: &str) -> String {
    match code.to_ascii_lowercase().as_str() {
        "int" => modules::INTEGRATIONS.to_string(),
        "usr" | "users" | "user" => modules::USERS_ROLES.to_string(),
        other => other.to_string(),
    }
}

fn uuid_or_nil(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or(Uuid::nil())
}

/// Reshapes the upstream profile payload into the record the decision
/// procedure consumes. Audit fields the upstream omits are filled with
/// neutral values; only email, status, and the permission map drive
/// authorization.
pub(crate) fn transform_profile(profile: RemoteProfile) -> UserPermissionRecord {
    let mut permissions: BTreeMap<String, PermissionLevel> = BTreeMap::new();
    for module in &profile.modules {
        let code = remap_module_code(&module.module_code);

        // Take-the-highest: WRITE dominates READ.
        let level = if module.permissions.iter().any(|p| p == "WRITE") {
            Some(PermissionLevel::Write)
        } else if module.permissions.iter().any(|p| p == "READ") {
            Some(PermissionLevel::Read)
        } else {
            None
        };

        if let Some(level) = level {
            permissions
                .entry(code)
                .and_modify(|existing| {
                    if level > *existing {
                        *existing = level;
                    }
                })
                .or_insert(level);
        }
    }

    let status = profile
        .status
        .as_deref()
        .and_then(UserStatus::parse)
        .unwrap_or(UserStatus::Inactive);

    let role = profile.role.map(|role| Role {
        role_id: uuid_or_nil(&role.role_id),
        role_name: role.role_name.unwrap_or_default(),
        role_description: role.role_description,
        is_system_role: role.is_system_role,
        created_at: DateTime::UNIX_EPOCH,
        created_by: "SYSTEM".to_string(),
        updated_at: None,
        updated_by: None,
    });

    let user = User {
        user_id: uuid_or_nil(&profile.user_id),
        email: profile.email.unwrap_or_default(),
        display_name: profile.display_name.unwrap_or_default(),
        role_id: role.as_ref().map(|r| r.role_id).unwrap_or(Uuid::nil()),
        status,
        last_access_at: profile.last_access_at,
        created_at: profile.user_created_at.unwrap_or(DateTime::UNIX_EPOCH),
        created_by: "SYSTEM".to_string(),
        updated_at: None,
        updated_by: None,
    };

    UserPermissionRecord {
        user,
        role,
        permissions,
        status,
    }
}
