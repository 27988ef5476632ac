use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Authorized;
use crate::errors::{AppError, AppResult};
use crate::models::role::{DbRole, Role};
use crate::models::user::{
    DbUser, User, UserCreateRequest, UserStatus, UserUpdateRequest, UserWithRole,
};

const SELECT_USER: &str = "SELECT id, email, display_name, role_id, status, last_access_at, \
     created_at, created_by, updated_at, updated_by FROM users";

#[utoipa::path(
    get,
    path = "/auth/users",
    tag = "Users & Roles",
    responses((status = 200, description = "All users with their role", body = Vec<UserWithRole>)),
    security(("userToken" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Authorized(_caller): Authorized,
) -> AppResult<Json<Vec<UserWithRole>>> {
    let db_users = sqlx::query_as::<_, DbUser>(&format!("{SELECT_USER} ORDER BY created_at"))
        .fetch_all(&state.pool)
        .await?;

    let db_roles = sqlx::query_as::<_, DbRole>(
        "SELECT id, name, description, is_system_role, created_at, created_by, updated_at, updated_by FROM roles",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut roles: HashMap<Uuid, Role> = HashMap::new();
    for db_role in db_roles {
        let role: Role = db_role.try_into()?;
        roles.insert(role.role_id, role);
    }

    let mut result = Vec::with_capacity(db_users.len());
    for db_user in db_users {
        let user: User = db_user.try_into()?;
        let role = roles.get(&user.role_id).cloned();
        result.push(UserWithRole { user, role });
    }

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/auth/users",
    tag = "Users & Roles",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing required fields"),
        (status = 409, description = "Email already registered"),
    ),
    security(("userToken" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let (Some(email), Some(display_name), Some(role_id)) =
        (payload.email, payload.display_name, payload.role_id)
    else {
        return Err(AppError::bad_request(
            "missing required fields: email, displayName, roleId",
        ));
    };
    if email.trim().is_empty() || display_name.trim().is_empty() {
        return Err(AppError::bad_request(
            "missing required fields: email, displayName, roleId",
        ));
    }

    let mut tx = state.pool.begin().await?;

    let duplicates: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? COLLATE NOCASE")
            .bind(&email)
            .fetch_one(&mut *tx)
            .await?;
    if duplicates > 0 {
        return Err(AppError::conflict("a user with this email already exists"));
    }

    ensure_role_exists(&mut tx, role_id).await?;

    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let status = payload.status.unwrap_or(UserStatus::Active);

    sqlx::query(
        "INSERT INTO users (id, email, display_name, role_id, status, created_at, created_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&email)
    .bind(&display_name)
    .bind(role_id.to_string())
    .bind(status.as_str())
    .bind(now)
    .bind(&caller.user.email)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let user = User {
        user_id,
        email,
        display_name,
        role_id,
        status,
        last_access_at: None,
        created_at: now,
        created_by: caller.user.email,
        updated_at: None,
        updated_by: None,
    };

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    put,
    path = "/auth/users/{id}",
    tag = "Users & Roles",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "Unknown user or role"),
    ),
    security(("userToken" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let mut tx = state.pool.begin().await?;

    let db_user = sqlx::query_as::<_, DbUser>(&format!("{SELECT_USER} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let mut user: User = db_user
        .ok_or_else(|| AppError::not_found("user not found"))?
        .try_into()?;

    if let Some(role_id) = payload.role_id {
        ensure_role_exists(&mut tx, role_id).await?;
        user.role_id = role_id;
    }
    if let Some(display_name) = payload.display_name {
        user.display_name = display_name;
    }
    if let Some(status) = payload.status {
        user.status = status;
    }

    let now = Utc::now();
    user.updated_at = Some(now);
    user.updated_by = Some(caller.user.email.clone());

    sqlx::query(
        "UPDATE users SET display_name = ?, role_id = ?, status = ?, updated_at = ?, updated_by = ? \
         WHERE id = ?",
    )
    .bind(&user.display_name)
    .bind(user.role_id.to_string())
    .bind(user.status.as_str())
    .bind(now)
    .bind(&caller.user.email)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(user))
}

async fn ensure_role_exists(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    role_id: Uuid,
) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .fetch_one(&mut **tx)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("role not found"));
    }

    Ok(())
}

// Some handlers only need the pool; keep the signature narrow for reuse in
// the profile route.
pub async fn stamp_last_access(pool: &SqlitePool, email: &str) -> AppResult<Option<chrono::DateTime<Utc>>> {
    let now = Utc::now();
    let updated = sqlx::query("UPDATE users SET last_access_at = ? WHERE email = ? COLLATE NOCASE")
        .bind(now)
        .bind(email)
        .execute(pool)
        .await?;

    Ok((updated.rows_affected() > 0).then_some(now))
}
