use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use campus_gateway::create_app;

const SECRET: &str = "test-secret";
const TENANT: &str = "test-tenant";
const AUDIENCE: &str = "sso-client";

const ADMIN_ROLE: &str = "33333333-3333-4333-8333-333333333333";
const READ_ONLY_ROLE: &str = "44444444-4444-4444-8444-444444444444";

async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("AZURE_TENANT_ID", TENANT);
    std::env::set_var("SSO_CLIENT_ID", AUDIENCE);
    std::env::set_var("USER_TOKEN_SECRET", SECRET);

    let app = create_app(pool.clone()).await.context("create_app failed")?;
    Ok((app, pool, dir))
}

fn token(email: &str) -> String {
    let claims = json!({
        "iss": format!("https://login.microsoftonline.com/{TENANT}/v2.0"),
        "aud": AUDIENCE,
        "exp": chrono::Utc::now().timestamp() + 3600,
        "email": email,
    });
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token encoding")
}

async fn seed_user(pool: &SqlitePool, email: &str, role_id: &str, status: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, email, display_name, role_id, status, created_at, created_by) \
         VALUES (?, ?, ?, ?, ?, ?, 'SYSTEM')",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(email)
    .bind(email)
    .bind(role_id)
    .bind(status)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_profile(app: &Router, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-user-token", token)
        .body(Body::empty())?;

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn profile_resolves_role_and_permissions() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "admin@university.edu", ADMIN_ROLE, "active").await?;

    let token = token("admin@university.edu");
    let (status, body) = get_profile(&app, "/auth/user-profile", &token).await?;

    assert_eq!(status, StatusCode::OK, "profile failed: {body}");
    assert_eq!(body["user"]["email"], "admin@university.edu");
    assert_eq!(body["role"]["roleName"], "Administrator");
    assert_eq!(body["status"], "active");
    assert_eq!(body["permissions"]["integrations"], "WRITE");
    assert_eq!(body["permissions"]["users-roles"], "WRITE");
    Ok(())
}

#[tokio::test]
async fn profile_defaults_to_the_token_email() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "viewer@university.edu", READ_ONLY_ROLE, "active").await?;

    let token = token("viewer@university.edu");
    let (status, body) = get_profile(&app, "/auth/user-profile", &token).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permissions"]["integrations"], "READ");
    assert!(body["permissions"].get("users-roles").is_none());
    Ok(())
}

#[tokio::test]
async fn profile_needs_only_a_valid_token_not_module_access() -> Result<()> {
    // A viewer holds no users-roles grant yet still reads their own profile;
    // this is what the dashboard bootstraps from.
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "viewer@university.edu", READ_ONLY_ROLE, "active").await?;

    let viewer = token("viewer@university.edu");
    let (status, _) = get_profile(&app, "/auth/user-profile", &viewer).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn profile_for_unknown_email_is_user_not_found() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "admin@university.edu", ADMIN_ROLE, "active").await?;

    let token = token("admin@university.edu");
    let (status, body) = get_profile(
        &app,
        "/auth/user-profile?email=ghost@university.edu",
        &token,
    )
    .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "UserNotFound");
    assert_eq!(body["details"]["userEmail"], "ghost@university.edu");
    Ok(())
}

#[tokio::test]
async fn inactive_account_still_resolves_with_empty_permissions() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "gone@university.edu", ADMIN_ROLE, "inactive").await?;

    let token = token("gone@university.edu");
    let (status, body) = get_profile(&app, "/auth/user-profile", &token).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["permissions"], json!({}));
    assert!(body["role"].is_null());
    Ok(())
}

#[tokio::test]
async fn profile_stamps_last_access() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    seed_user(&pool, "admin@university.edu", ADMIN_ROLE, "active").await?;

    let token = token("admin@university.edu");
    let (_, body) = get_profile(&app, "/auth/user-profile", &token).await?;
    assert!(body["user"]["lastAccessAt"].is_string());

    let stored: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
        "SELECT last_access_at FROM users WHERE email = 'admin@university.edu'",
    )
    .fetch_one(&pool)
    .await?;
    assert!(stored.is_some());
    Ok(())
}

#[tokio::test]
async fn profile_without_token_is_unauthorized() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let req = Request::builder()
        .method("GET")
        .uri("/auth/user-profile")
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
