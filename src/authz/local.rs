use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{PermissionDirectory, PermissionLevel, UserPermissionRecord};
use crate::errors::AppError;
use crate::models::role::{DbRole, Role};
use crate::models::user::{DbUser, User};

/// Directory backed by the gateway's own SQLite store: user -> role ->
/// role_permissions -> active modules, matched case-insensitively on email.
pub struct LocalDirectory {
    pool: SqlitePool,
}

impl LocalDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionDirectory for LocalDirectory {
    async fn lookup(&self, email: &str) -> Result<Option<UserPermissionRecord>, AppError> {
        let db_user = sqlx::query_as::<_, DbUser>(
            "SELECT id, email, display_name, role_id, status, last_access_at, created_at, created_by, updated_at, updated_by \
             FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(db_user) = db_user else {
            return Ok(None);
        };

        let user: User = db_user.try_into()?;
        let status = user.status;

        // A non-active user still resolves, but with an empty permission
        // set; the caller inspects `status` separately.
        if !status.is_active() {
            return Ok(Some(UserPermissionRecord {
                user,
                role: None,
                permissions: BTreeMap::new(),
                status,
            }));
        }

        let db_role = sqlx::query_as::<_, DbRole>(
            "SELECT id, name, description, is_system_role, created_at, created_by, updated_at, updated_by \
             FROM roles WHERE id = ?",
        )
        .bind(user.role_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        let role: Option<Role> = db_role.map(Role::try_from).transpose()?;

        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT m.code, rp.permission_type \
             FROM role_permissions rp \
             JOIN modules m ON m.id = rp.module_id \
             WHERE rp.role_id = ? AND m.is_active = 1",
        )
        .bind(user.role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut permissions = BTreeMap::new();
        for (code, level) in rows {
            let Some(level) = PermissionLevel::parse(&level) else {
                continue;
            };
            permissions
                .entry(code)
                .and_modify(|existing| {
                    if level > *existing {
                        *existing = level;
                    }
                })
                .or_insert(level);
        }

        Ok(Some(UserPermissionRecord {
            user,
            role,
            permissions,
            status,
        }))
    }
}
