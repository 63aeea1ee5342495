//! API error types.
//!
//! Every error renders as a `{ "success": false, "message": ... }` JSON
//! envelope so clients see a uniform failure shape across the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// API-level errors mapped to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication missing, invalid, or revoked (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials rejected (401)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Resource contention, e.g. a lock could not be obtained (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed request payload (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Anything unexpected (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal details stay in the logs.
    fn message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error");
        }

        let body = json!({
            "success": false,
            "message": self.message(),
        });

        (self.status(), Json(body)).into_response()
    }
}

impl From<meridian_coord::CoordError> for ApiError {
    fn from(err: meridian_coord::CoordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
