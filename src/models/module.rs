use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// A permission domain. The catalog is near-static: "integrations" covers
/// every Banner data route, "users-roles" the identity administration
/// surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub module_id: Uuid,
    pub module_code: String,
    pub module_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbModule {
    pub id: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
}

impl TryFrom<DbModule> for Module {
    type Error = AppError;

    fn try_from(value: DbModule) -> Result<Self, Self::Error> {
        let module_id = Uuid::parse_str(&value.id)
            .map_err(|_| AppError::internal(format!("malformed module id: {}", value.id)))?;

        Ok(Module {
            module_id,
            module_code: value.code,
            module_name: value.name,
            is_active: value.is_active,
        })
    }
}
