use crate::errors::AppError;

/// How the permission directory is backed: the local SQLite store or the
/// upstream user-profile endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryMode {
    Local,
    Remote,
}

/// Client-credentials configuration for calling the API-management-fronted
/// backend. Optional: without it the Banner proxy and the remote directory
/// refuse to start, but the local admin surface still works.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub token_url: String,
    pub subscription_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `iss` the identity token must carry.
    pub expected_issuer: String,
    /// `aud` the identity token must carry (the SSO application id).
    pub expected_audience: String,
    /// JWKS endpoint of the identity provider, for RS256 verification.
    pub jwks_url: String,
    /// HS256 secret overriding JWKS verification; dev and test only.
    pub user_token_secret: Option<String>,
    pub directory_mode: DirectoryMode,
    pub upstream: Option<UpstreamConfig>,
    /// First administrator created on an empty user table, if set.
    pub bootstrap_admin_email: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let tenant_id = require("AZURE_TENANT_ID")?;
        let expected_audience = require("SSO_CLIENT_ID")?;

        let expected_issuer =
            format!("https://login.microsoftonline.com/{tenant_id}/v2.0");
        let jwks_url = format!(
            "https://login.microsoftonline.com/{tenant_id}/discovery/v2.0/keys"
        );
        let token_url =
            format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");

        let directory_mode = match optional("PERMISSION_DIRECTORY").as_deref() {
            Some("remote") => DirectoryMode::Remote,
            Some("local") | None => DirectoryMode::Local,
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "PERMISSION_DIRECTORY must be 'local' or 'remote', got '{other}'"
                )))
            }
        };

        let upstream = match optional("API_BASE_URL") {
            Some(base_url) => Some(UpstreamConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                client_id: require("API_CLIENT_ID")?,
                client_secret: require("API_CLIENT_SECRET")?,
                scope: require("API_SCOPE")?,
                token_url,
                subscription_key: optional("APIM_SUBSCRIPTION_KEY"),
            }),
            None => None,
        };

        if directory_mode == DirectoryMode::Remote && upstream.is_none() {
            return Err(AppError::configuration(
                "PERMISSION_DIRECTORY=remote requires API_BASE_URL and client credentials",
            ));
        }

        Ok(Self {
            expected_issuer,
            expected_audience,
            jwks_url,
            user_token_secret: optional("USER_TOKEN_SECRET"),
            directory_mode,
            upstream,
            bootstrap_admin_email: optional("BOOTSTRAP_ADMIN_EMAIL"),
        })
    }
}

fn require(name: &'static str) -> Result<String, AppError> {
    optional(name).ok_or_else(|| AppError::configuration(format!("{name} not set")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
