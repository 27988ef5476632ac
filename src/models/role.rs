use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::PermissionLevel;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_description: Option<String>,
    /// Built-in roles refuse rename, permission edits, and deletion.
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(value: DbRole) -> Result<Self, Self::Error> {
        let role_id = Uuid::parse_str(&value.id)
            .map_err(|_| AppError::internal(format!("malformed role id: {}", value.id)))?;

        Ok(Role {
            role_id,
            role_name: value.name,
            role_description: value.description,
            is_system_role: value.is_system_role,
            created_at: value.created_at,
            created_by: value.created_by,
            updated_at: value.updated_at,
            updated_by: value.updated_by,
        })
    }
}

/// One module grant of a role, as the roles table in the dashboard shows it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionEntry {
    pub module_code: String,
    pub module_name: String,
    pub permission_type: PermissionLevel,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permission_count: usize,
    pub user_count: i64,
    pub permissions: Vec<RolePermissionEntry>,
}

/// A requested module grant. Unknown module codes are skipped, matching the
/// lineage behavior.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    #[schema(example = "integrations")]
    pub module_code: String,
    pub permission_type: PermissionLevel,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleCreateRequest {
    #[schema(example = "Registrar")]
    pub role_name: Option<String>,
    pub role_description: Option<String>,
    pub permissions: Option<Vec<PermissionGrant>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdateRequest {
    pub role_name: Option<String>,
    pub role_description: Option<String>,
    /// When present, replaces the role's permission set wholesale.
    pub permissions: Option<Vec<PermissionGrant>>,
}
