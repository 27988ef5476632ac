use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Authorized, PermissionLevel};
use crate::errors::{AppError, AppResult};
use crate::models::role::{
    DbRole, PermissionGrant, Role, RoleCreateRequest, RolePermissionEntry, RoleUpdateRequest,
    RoleWithPermissions,
};

const SELECT_ROLE: &str = "SELECT id, name, description, is_system_role, created_at, created_by, \
     updated_at, updated_by FROM roles";

#[utoipa::path(
    get,
    path = "/auth/roles",
    tag = "Users & Roles",
    responses((status = 200, description = "Roles with their module grants", body = Vec<RoleWithPermissions>)),
    security(("userToken" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Authorized(_caller): Authorized,
) -> AppResult<Json<Vec<RoleWithPermissions>>> {
    let db_roles = sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} ORDER BY created_at"))
        .fetch_all(&state.pool)
        .await?;

    let grant_rows = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT rp.role_id, m.code, m.name, rp.permission_type \
         FROM role_permissions rp JOIN modules m ON m.id = rp.module_id",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut grants: HashMap<String, Vec<RolePermissionEntry>> = HashMap::new();
    for (role_id, code, name, level) in grant_rows {
        let Some(permission_type) = PermissionLevel::parse(&level) else {
            continue;
        };
        grants.entry(role_id).or_default().push(RolePermissionEntry {
            module_code: code,
            module_name: name,
            permission_type,
        });
    }

    let count_rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT role_id, COUNT(1) FROM users GROUP BY role_id",
    )
    .fetch_all(&state.pool)
    .await?;
    let user_counts: HashMap<String, i64> = count_rows.into_iter().collect();

    let mut result = Vec::with_capacity(db_roles.len());
    for db_role in db_roles {
        let key = db_role.id.clone();
        let role: Role = db_role.try_into()?;
        let permissions = grants.remove(&key).unwrap_or_default();
        result.push(RoleWithPermissions {
            role,
            permission_count: permissions.len(),
            user_count: user_counts.get(&key).copied().unwrap_or(0),
            permissions,
        });
    }

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/auth/roles",
    tag = "Users & Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Missing required fields"),
    ),
    security(("userToken" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let (Some(role_name), Some(permissions)) = (payload.role_name, payload.permissions) else {
        return Err(AppError::bad_request(
            "missing required fields: roleName, permissions",
        ));
    };
    if role_name.trim().is_empty() {
        return Err(AppError::bad_request(
            "missing required fields: roleName, permissions",
        ));
    }

    let role_id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO roles (id, name, description, is_system_role, created_at, created_by) \
         VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(role_id.to_string())
    .bind(&role_name)
    .bind(&payload.role_description)
    .bind(now)
    .bind(&caller.user.email)
    .execute(&mut *tx)
    .await?;

    insert_grants(&mut tx, role_id, &permissions).await?;
    tx.commit().await?;

    let role = Role {
        role_id,
        role_name,
        role_description: payload.role_description,
        is_system_role: false,
        created_at: now,
        created_by: caller.user.email,
        updated_at: None,
        updated_by: None,
    };

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    put,
    path = "/auth/roles/{id}",
    tag = "Users & Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 403, description = "System roles cannot be modified"),
        (status = 404, description = "Unknown role"),
    ),
    security(("userToken" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let mut tx = state.pool.begin().await?;
    let mut role = fetch_role(&mut tx, id).await?;

    // Data-level invariant, checked after the permission gate: built-in
    // roles stay as shipped even for WRITE-holding callers.
    if role.is_system_role {
        return Err(AppError::forbidden("system roles cannot be modified"));
    }

    if let Some(role_name) = payload.role_name {
        role.role_name = role_name;
    }
    if let Some(description) = payload.role_description {
        role.role_description = Some(description);
    }

    let now = Utc::now();
    role.updated_at = Some(now);
    role.updated_by = Some(caller.user.email.clone());

    sqlx::query("UPDATE roles SET name = ?, description = ?, updated_at = ?, updated_by = ? WHERE id = ?")
        .bind(&role.role_name)
        .bind(&role.role_description)
        .bind(now)
        .bind(&caller.user.email)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    // Permission replacement is wholesale when requested.
    if let Some(permissions) = &payload.permissions {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        insert_grants(&mut tx, id, permissions).await?;
    }

    tx.commit().await?;

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/auth/roles/{id}",
    tag = "Users & Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "System roles cannot be deleted"),
        (status = 404, description = "Unknown role"),
        (status = 409, description = "Role still assigned to users"),
    ),
    security(("userToken" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Authorized(_caller): Authorized,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut tx = state.pool.begin().await?;
    let role = fetch_role(&mut tx, id).await?;

    if role.is_system_role {
        return Err(AppError::forbidden("system roles cannot be deleted"));
    }

    let assigned: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE role_id = ?")
        .bind(id.to_string())
        .fetch_one(&mut *tx)
        .await?;
    if assigned > 0 {
        return Err(AppError::conflict("role is still assigned to users"));
    }

    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_role(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, id: Uuid) -> AppResult<Role> {
    let db_role = sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

    db_role
        .ok_or_else(|| AppError::not_found("role not found"))?
        .try_into()
}

/// Inserts the requested grants, one row per module, WRITE dominating when a
/// module is named twice. Unknown module codes are skipped.
async fn insert_grants(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    role_id: Uuid,
    grants: &[PermissionGrant],
) -> AppResult<()> {
    let mut requested: BTreeMap<String, PermissionLevel> = BTreeMap::new();
    for grant in grants {
        requested
            .entry(grant.module_code.to_ascii_lowercase())
            .and_modify(|existing| {
                if grant.permission_type > *existing {
                    *existing = grant.permission_type;
                }
            })
            .or_insert(grant.permission_type);
    }

    for (module_code, level) in requested {
        let module_id: Option<String> = sqlx::query_scalar("SELECT id FROM modules WHERE code = ?")
            .bind(&module_code)
            .fetch_optional(&mut **tx)
            .await?;
        let Some(module_id) = module_id else {
            tracing::debug!(%module_code, "skipping grant for unknown module");
            continue;
        };

        sqlx::query(
            "INSERT INTO role_permissions (id, role_id, module_id, permission_type) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(role_id.to_string())
        .bind(module_id)
        .bind(level.as_str())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
