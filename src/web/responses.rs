use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// `{"success": true, "message": ...}` acknowledgement.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

/// Helper for controllers that need to return `(StatusCode, Json<ApiError>)`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(message)))
}
