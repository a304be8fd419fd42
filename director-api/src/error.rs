use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use director_core::OperationError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            OperationError::InvalidData(msg) => ApiError::BadRequest(msg),
            OperationError::ConcurrentOperationInProgress(_) => ApiError::Conflict(err.to_string()),
            OperationError::TenantRequired => ApiError::Forbidden(err.to_string()),
            OperationError::Internal(msg) => ApiError::Internal(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
