use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::authz::Authorized;
use crate::errors::AppResult;
use crate::models::module::{DbModule, Module};

#[utoipa::path(
    get,
    path = "/auth/modules",
    tag = "Users & Roles",
    responses((status = 200, description = "Active permission modules", body = Vec<Module>)),
    security(("userToken" = []))
)]
pub async fn list_modules(
    State(state): State<AppState>,
    Authorized(_caller): Authorized,
) -> AppResult<Json<Vec<Module>>> {
    let db_modules = sqlx::query_as::<_, DbModule>(
        "SELECT id, code, name, is_active FROM modules WHERE is_active = 1 ORDER BY code",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut result = Vec::with_capacity(db_modules.len());
    for db_module in db_modules {
        result.push(db_module.try_into()?);
    }

    Ok(Json(result))
}
