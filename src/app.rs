use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{LocalDirectory, PermissionDirectory, RemoteDirectory};
use crate::config::{DirectoryMode, GatewayConfig};
use crate::errors::AppError;
use crate::identity::TokenValidator;
use crate::routes::{banner, health, modules, profile, roles, users};
use crate::upstream::{ServiceTokenProvider, UpstreamClient};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<GatewayConfig>,
    pub validator: Arc<TokenValidator>,
    pub directory: Arc<dyn PermissionDirectory>,
    pub upstream: Option<Arc<UpstreamClient>>,
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = GatewayConfig::from_env()?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| AppError::configuration(format!("http client: {err}")))?;

    let validator = Arc::new(TokenValidator::new(&config, http.clone()));

    let (upstream, tokens) = match config.upstream.clone() {
        Some(upstream_config) => {
            let tokens = Arc::new(ServiceTokenProvider::new(
                upstream_config.clone(),
                http.clone(),
            ));
            let client = Arc::new(UpstreamClient::new(
                upstream_config,
                Arc::clone(&tokens),
                http.clone(),
            ));
            (Some(client), Some(tokens))
        }
        None => (None, None),
    };

    let directory: Arc<dyn PermissionDirectory> = match config.directory_mode {
        DirectoryMode::Local => Arc::new(LocalDirectory::new(pool.clone())),
        DirectoryMode::Remote => {
            let upstream_config = config
                .upstream
                .as_ref()
                .ok_or_else(|| AppError::configuration("remote directory without upstream"))?;
            let tokens =
                tokens.ok_or_else(|| AppError::configuration("remote directory without credentials"))?;
            Arc::new(RemoteDirectory::new(
                upstream_config.base_url.clone(),
                upstream_config.subscription_key.clone(),
                tokens,
                http.clone(),
            ))
        }
    };

    if let Some(email) = &config.bootstrap_admin_email {
        crate::db::bootstrap_admin(&pool, email).await?;
    }

    let state = AppState {
        pool,
        config: Arc::new(config),
        validator,
        directory,
        upstream,
    };

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-user-token"),
            HeaderName::from_static("x-secret-write"),
        ]);

    let auth_routes = Router::new()
        .route("/user-profile", get(profile::get_user_profile))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", put(users::update_user))
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/roles/:id",
            put(roles::update_role).delete(roles::delete_role),
        )
        .route("/modules", get(modules::list_modules));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .route("/banner/*route", any(banner::proxy))
        .with_state(state)
        .layer(middleware::from_fn(preflight))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

/// Answers bare `OPTIONS` with 204 before authorization runs. Browser
/// preflights never reach this; the CORS layer handles those.
async fn preflight(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(Default::default());
        *response.status_mut() = StatusCode::NO_CONTENT;
        return response;
    }
    next.run(request).await
}
