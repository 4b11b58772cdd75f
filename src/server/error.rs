//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{BridgeError, ErrorKind};

/// Error returned by a handler
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request rejected before dispatch (400)
    #[error("Invalid request: {0}")]
    BadRequest(BridgeError),

    /// Body could not be decoded (400)
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Engine could not be made healthy (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(BridgeError),

    /// Restart did not bring the engine back (500)
    #[error("Restart failed: {0}")]
    RestartFailed(String),

    /// Anything else (500, opaque to the caller)
    #[error("Internal error: {0}")]
    Internal(BridgeError),
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::BadRequest(err),
            ErrorKind::ServiceUnavailable => ApiError::ServiceUnavailable(err),
            ErrorKind::Engine | ErrorKind::Internal => ApiError::Internal(err),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, suggestions) = match self {
            ApiError::BadRequest(err) => (
                StatusCode::BAD_REQUEST,
                err.error_code(),
                err.public_message(),
                err.recovery_suggestions(),
            ),
            ApiError::InvalidBody(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_PARAMETER",
                msg,
                Vec::new(),
            ),
            ApiError::ServiceUnavailable(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.error_code(),
                err.public_message(),
                err.recovery_suggestions(),
            ),
            ApiError::RestartFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "RESTART_FAILED",
                msg,
                Vec::new(),
            ),
            ApiError::Internal(err) => {
                error!(error = %err, "internal error handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.error_code(),
                    err.public_message(),
                    Vec::new(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "suggestions": suggestions,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = ApiError::from(BridgeError::missing("input_path")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError::from(BridgeError::ServiceUnavailable {
            reason: "down".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = ApiError::from(BridgeError::Internal("bad state".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
