use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {message}")]
    Forbidden {
        message: String,
        details: Option<Value>,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {message}")]
    NotFound {
        kind: &'static str,
        message: String,
        details: Option<Value>,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// Unrecognized upstream non-2xx, passed through with its original
    /// status and body.
    #[error("upstream responded with status {status}")]
    Upstream { status: u16, body: Value },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("upstream transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden_with(message: impl Into<String>, details: Value) -> Self {
        Self::Forbidden {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "NotFound",
            message: message.into(),
            details: None,
        }
    }

    /// Not-found with a translated kind, e.g. `UserNotFound` or
    /// `PersonNotFound`.
    pub fn not_found_kind(kind: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            kind,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // An unrecognized upstream error keeps its original status and body.
        if let AppError::Upstream { status, body } = self {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(body)).into_response();
        }

        let (status, error) = match &self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AppError::Forbidden { .. } => (StatusCode::FORBIDDEN, "Forbidden"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            AppError::NotFound { kind, .. } => (StatusCode::NOT_FOUND, *kind),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable"),
            AppError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "ApiError"),
            AppError::Http(_) => (StatusCode::BAD_GATEWAY, "ApiError"),
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let (message, details) = match self {
            AppError::Forbidden { message, details } => (message, details),
            AppError::NotFound {
                message, details, ..
            } => (message, details),
            // The frontend treats any non-2xx as a terminal alert with the
            // message, so the raw error text is attached for diagnosis.
            other => (other.to_string(), None),
        };

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
            details,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
