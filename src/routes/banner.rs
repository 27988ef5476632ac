use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::authz::Authorized;
use crate::errors::{AppError, AppResult};

const SECRET_WRITE_HEADER: &str = "x-secret-write";

/// Catch-all proxy to the Banner backend. The subpath after `/banner/` is
/// forwarded verbatim, query string and JSON body included, with the
/// gateway's own service credential attached in place of the user's token.
#[utoipa::path(
    get,
    path = "/banner/{route}",
    tag = "Banner",
    params(("route" = String, Path, description = "Upstream route, e.g. person/123")),
    responses(
        (status = 200, description = "Upstream response, passed through"),
        (status = 404, description = "No matching upstream resource"),
        (status = 503, description = "Upstream backend not configured or unreachable"),
    ),
    security(("userToken" = []))
)]
pub async fn proxy(
    State(state): State<AppState>,
    Authorized(_caller): Authorized,
    method: Method,
    Path(route): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    let Some(upstream) = &state.upstream else {
        return Err(AppError::unavailable("upstream backend is not configured"));
    };

    let body = if body.is_empty() {
        None
    } else {
        let parsed: Value = serde_json::from_slice(&body)
            .map_err(|_| AppError::bad_request("request body must be valid JSON"))?;
        Some(parsed)
    };

    let secret_write = headers
        .get(SECRET_WRITE_HEADER)
        .and_then(|value| value.to_str().ok());

    let response = upstream
        .forward(&method, &route, query.as_deref(), body.as_ref(), secret_write)
        .await?;

    if response.is_success() {
        let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
        return Ok((status, Json(response.body)));
    }

    // A missing person is an expected outcome for ID lookups; translate it
    // so the dashboard can show a targeted message.
    if response.status == 404 && route.to_ascii_lowercase().starts_with("person/") {
        return Err(AppError::not_found_kind(
            "PersonNotFound",
            "no person found with the provided Banner ID",
            json!({ "route": route }),
        ));
    }

    let body = if response.body.is_null() {
        json!({
            "error": "ApiError",
            "message": format!("API responded with status {}", response.status),
        })
    } else {
        response.body
    };

    Err(AppError::Upstream {
        status: response.status,
        body,
    })
}
