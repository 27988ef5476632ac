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

async fn setup_with_admin() -> Result<(Router, SqlitePool, TempDir, String)> {
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

    sqlx::query(
        "INSERT INTO users (id, email, display_name, role_id, status, created_at, created_by) \
         VALUES (?, 'admin@university.edu', 'Admin', ?, 'active', ?, 'SYSTEM')",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(ADMIN_ROLE)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await?;

    let app = create_app(pool.clone()).await.context("create_app failed")?;
    let token = token("admin@university.edu");
    Ok((app, pool, dir, token))
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

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body_json: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-token", token);
    let body = match body_json {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let resp = app.clone().oneshot(builder.body(body)?).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

#[tokio::test]
async fn user_crud_flow() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    // create
    let (status, created) = request(
        &app,
        "POST",
        "/auth/users",
        &admin,
        Some(json!({
            "email": "grace@university.edu",
            "displayName": "Grace Hopper",
            "roleId": READ_ONLY_ROLE
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {created}");
    assert_eq!(created["email"], "grace@university.edu");
    assert_eq!(created["status"], "active");
    assert_eq!(created["createdBy"], "admin@university.edu");
    let user_id = created["userId"].as_str().context("userId")?.to_string();

    // list includes the resolved role
    let (status, listed) = request(&app, "GET", "/auth/users", &admin, None).await?;
    assert_eq!(status, StatusCode::OK);
    let grace = listed
        .as_array()
        .context("array")?
        .iter()
        .find(|u| u["email"] == "grace@university.edu")
        .context("grace missing from list")?;
    assert_eq!(grace["role"]["roleName"], "Read Only");

    // update role and status
    let (status, updated) = request(
        &app,
        "PUT",
        &format!("/auth/users/{user_id}"),
        &admin,
        Some(json!({ "roleId": ADMIN_ROLE, "status": "suspended" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["roleId"], ADMIN_ROLE);
    assert_eq!(updated["status"], "suspended");
    assert_eq!(updated["updatedBy"], "admin@university.edu");
    Ok(())
}

#[tokio::test]
async fn create_user_rejects_missing_fields() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    let (status, body) = request(
        &app,
        "POST",
        "/auth/users",
        &admin,
        Some(json!({ "email": "incomplete@university.edu" })),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");
    assert!(body["message"].as_str().unwrap().contains("displayName"));
    Ok(())
}

#[tokio::test]
async fn create_user_rejects_duplicate_email_case_insensitively() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    let (status, body) = request(
        &app,
        "POST",
        "/auth/users",
        &admin,
        Some(json!({
            "email": "ADMIN@university.edu",
            "displayName": "Dup",
            "roleId": READ_ONLY_ROLE
        })),
    )
    .await?;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
    Ok(())
}

#[tokio::test]
async fn create_user_rejects_unknown_role() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    let (status, body) = request(
        &app,
        "POST",
        "/auth/users",
        &admin,
        Some(json!({
            "email": "orphan@university.edu",
            "displayName": "Orphan",
            "roleId": uuid::Uuid::new_v4()
        })),
    )
    .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "role not found");
    Ok(())
}

#[tokio::test]
async fn update_unknown_user_is_not_found() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    let (status, _) = request(
        &app,
        "PUT",
        &format!("/auth/users/{}", uuid::Uuid::new_v4()),
        &admin,
        Some(json!({ "displayName": "Ghost" })),
    )
    .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn role_crud_flow() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    // create with duplicate grants for the same module; WRITE wins
    let (status, created) = request(
        &app,
        "POST",
        "/auth/roles",
        &admin,
        Some(json!({
            "roleName": "Registrar",
            "roleDescription": "Term planning",
            "permissions": [
                { "moduleCode": "integrations", "permissionType": "READ" },
                { "moduleCode": "integrations", "permissionType": "WRITE" },
                { "moduleCode": "no-such-module", "permissionType": "WRITE" }
            ]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {created}");
    assert_eq!(created["isSystemRole"], false);
    let role_id = created["roleId"].as_str().context("roleId")?.to_string();

    // list shows one collapsed grant, unknown module skipped
    let (status, listed) = request(&app, "GET", "/auth/roles", &admin, None).await?;
    assert_eq!(status, StatusCode::OK);
    let registrar = listed
        .as_array()
        .context("array")?
        .iter()
        .find(|r| r["roleName"] == "Registrar")
        .context("registrar missing")?;
    assert_eq!(registrar["permissionCount"], 1);
    assert_eq!(registrar["permissions"][0]["moduleCode"], "integrations");
    assert_eq!(registrar["permissions"][0]["permissionType"], "WRITE");
    assert_eq!(registrar["userCount"], 0);

    // rename and replace permissions wholesale
    let (status, updated) = request(
        &app,
        "PUT",
        &format!("/auth/roles/{role_id}"),
        &admin,
        Some(json!({
            "roleName": "Registrar Office",
            "permissions": [
                { "moduleCode": "users-roles", "permissionType": "READ" }
            ]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["roleName"], "Registrar Office");

    let (_, listed) = request(&app, "GET", "/auth/roles", &admin, None).await?;
    let registrar = listed
        .as_array()
        .context("array")?
        .iter()
        .find(|r| r["roleName"] == "Registrar Office")
        .context("renamed role missing")?;
    assert_eq!(registrar["permissions"][0]["moduleCode"], "users-roles");
    assert_eq!(registrar["permissionCount"], 1);

    // delete
    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/auth/roles/{role_id}"),
        &admin,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listed) = request(&app, "GET", "/auth/roles", &admin, None).await?;
    assert!(listed
        .as_array()
        .context("array")?
        .iter()
        .all(|r| r["roleId"] != role_id.as_str()));
    Ok(())
}

#[tokio::test]
async fn create_role_rejects_missing_fields() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    let (status, body) = request(
        &app,
        "POST",
        "/auth/roles",
        &admin,
        Some(json!({ "roleName": "No Permissions" })),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("permissions"));
    Ok(())
}

#[tokio::test]
async fn system_roles_refuse_update_and_delete() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    let (status, body) = request(
        &app,
        "PUT",
        &format!("/auth/roles/{ADMIN_ROLE}"),
        &admin,
        Some(json!({ "roleName": "Renamed" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "system roles cannot be modified");

    let (status, body) = request(
        &app,
        "DELETE",
        &format!("/auth/roles/{ADMIN_ROLE}"),
        &admin,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "system roles cannot be deleted");
    Ok(())
}

#[tokio::test]
async fn assigned_role_refuses_delete() -> Result<()> {
    let (app, _pool, _dir, admin) = setup_with_admin().await?;

    // Read Only is non-system; give it a user so the delete has to refuse.
    let (status, _) = request(
        &app,
        "POST",
        "/auth/users",
        &admin,
        Some(json!({
            "email": "viewer@university.edu",
            "displayName": "Viewer",
            "roleId": READ_ONLY_ROLE
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = request(
        &app,
        "DELETE",
        &format!("/auth/roles/{READ_ONLY_ROLE}"),
        &admin,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "role is still assigned to users");
    Ok(())
}

#[tokio::test]
async fn modules_lists_the_active_catalog() -> Result<()> {
    let (app, pool, _dir, admin) = setup_with_admin().await?;

    let (status, listed) = request(&app, "GET", "/auth/modules", &admin, None).await?;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = listed
        .as_array()
        .context("array")?
        .iter()
        .filter_map(|m| m["moduleCode"].as_str())
        .collect();
    assert_eq!(codes, vec!["integrations", "users-roles"]);

    // deactivated modules disappear from the catalog
    sqlx::query("UPDATE modules SET is_active = 0 WHERE code = 'integrations'")
        .execute(&pool)
        .await?;
    let (_, listed) = request(&app, "GET", "/auth/modules", &admin, None).await?;
    assert_eq!(listed.as_array().context("array")?.len(), 1);
    Ok(())
}
