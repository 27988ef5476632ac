use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Method;
use serde_json::json;

use super::{modules, module_for_path, PermissionLevel, UserPermissionRecord};
use crate::app::AppState;
use crate::errors::AppError;
use crate::identity::IdentityClaims;
use crate::models::user::UserStatus;

/// Header carrying the identity token. Not `Authorization`: the hosting
/// platform intercepts that one.
pub const USER_TOKEN_HEADER: &str = "x-user-token";

fn is_write_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    )
}

/// The authorization decision procedure: an ordered chain of gates, each
/// either failing terminally or falling through to the next. Denials are
/// ordinary `Err` values; only transport-level trouble maps to 5xx.
pub async fn authorize(
    state: &AppState,
    token_header: Option<&str>,
    path: &str,
    method: &Method,
) -> Result<UserPermissionRecord, AppError> {
    // 1. Token validation.
    let Some(claims) = state.validator.validate(token_header).await else {
        return Err(AppError::unauthorized("invalid or expired token"));
    };

    // 2. Directory lookup. A failing directory surfaces as 503, never as a
    //    misleading "unknown user" 403.
    let record = state.directory.lookup(&claims.email).await?;
    let Some(record) = record else {
        tracing::info!(email = %claims.email, "authenticated user has no account");
        return Err(AppError::forbidden_with(
            "user not authorized in the system",
            json!({ "userEmail": claims.email }),
        ));
    };

    // 3. Status check.
    if !record.status.is_active() {
        let message = match record.status {
            UserStatus::Inactive => "account disabled, contact administrator",
            _ => "account suspended, contact administrator",
        };
        return Err(AppError::forbidden_with(
            message,
            json!({ "userEmail": claims.email, "status": record.status }),
        ));
    }

    // 4. Module resolution. `None` would mean an unprotected route; the
    //    current table never produces one.
    let Some(module_code) = module_for_path(path) else {
        return Ok(record);
    };

    // 5. Read gate.
    let Some(level) = record.level_for(module_code) else {
        return Err(AppError::forbidden_with(
            format!("no access to module: {module_code}"),
            json!({ "moduleCode": module_code, "userEmail": claims.email }),
        ));
    };

    // 6. Write gate, scoped to the users-roles module only. Banner mutations
    //    are instead guarded by the upstream's shared write secret.
    if module_code == modules::USERS_ROLES
        && is_write_method(method)
        && level != PermissionLevel::Write
    {
        return Err(AppError::forbidden_with(
            format!("no write permission in: {module_code}"),
            json!({
                "moduleCode": module_code,
                "userEmail": claims.email,
                "permission": "READ_ONLY",
            }),
        ));
    }

    // 7. Grant.
    Ok(record)
}

fn token_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(USER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Extractor running the full gate chain against the request's token, path,
/// and method. Handlers taking it cannot run unauthorized.
pub struct Authorized(pub UserPermissionRecord);

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let record = authorize(state, token_header(parts), &path, &method).await?;
        Ok(Authorized(record))
    }
}

/// Identity-only gate: a valid token suffices, no module permission needed.
/// Used by the profile endpoint so a user can read their own permissions.
pub struct Identified(pub IdentityClaims);

#[async_trait]
impl FromRequestParts<AppState> for Identified {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = state
            .validator
            .validate(token_header(parts))
            .await
            .ok_or_else(|| AppError::unauthorized("invalid or expired token"))?;
        Ok(Identified(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_methods_are_write_gated() {
        assert!(is_write_method(&Method::POST));
        assert!(is_write_method(&Method::PUT));
        assert!(is_write_method(&Method::DELETE));
        assert!(is_write_method(&Method::PATCH));
    }

    #[test]
    fn read_methods_are_not() {
        assert!(!is_write_method(&Method::GET));
        assert!(!is_write_method(&Method::HEAD));
        assert!(!is_write_method(&Method::OPTIONS));
    }
}
