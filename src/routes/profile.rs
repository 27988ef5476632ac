use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::authz::{Identified, UserPermissionRecord};
use crate::errors::{AppError, AppResult};
use crate::routes::users::stamp_last_access;

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    email: Option<String>,
}

/// The dashboard's bootstrap call: resolves the caller's account, role, and
/// per-module permissions. Gated by token validity alone so a user whose
/// account is missing or disabled still gets a definite answer instead of a
/// circular 403.
#[utoipa::path(
    get,
    path = "/auth/user-profile",
    tag = "Users & Roles",
    params(("email" = Option<String>, Query, description = "Defaults to the token's email")),
    responses(
        (status = 200, description = "Resolved permission record", body = UserPermissionRecord),
        (status = 401, description = "Invalid or expired token"),
        (status = 404, description = "No account for this email"),
    ),
    security(("userToken" = []))
)]
pub async fn get_user_profile(
    State(state): State<AppState>,
    Identified(claims): Identified,
    Query(query): Query<ProfileQuery>,
) -> AppResult<Json<UserPermissionRecord>> {
    let email = query.email.unwrap_or(claims.email);

    let record = state.directory.lookup(&email).await?;
    let Some(mut record) = record else {
        return Err(AppError::not_found_kind(
            "UserNotFound",
            "user not authorized in the system",
            json!({ "userEmail": email }),
        ));
    };

    // The profile call marks activity; the gate chain itself never writes.
    if let Some(stamped) = stamp_last_access(&state.pool, &email).await? {
        record.user.last_access_at = Some(stamped);
    }

    Ok(Json(record))
}
