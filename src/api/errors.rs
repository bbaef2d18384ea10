#[cfg(feature = "ssr")]
use crate::error::{AppError, UploadError};
#[cfg(feature = "ssr")]
use axum::http::StatusCode;
#[cfg(feature = "ssr")]
use axum::response::{IntoResponse, Response};

/// API-specific error wrapper that converts AppError into HTTP responses.
#[cfg(feature = "ssr")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) | AppError::SlugExists(_) => StatusCode::CONFLICT,
            AppError::Upload(UploadError::Unconfigured) | AppError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::Validation(msg)
            | AppError::Auth(msg)
            | AppError::Conflict(msg)
            | AppError::SlugExists(msg)
            | AppError::Unavailable(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Upload(err) => err.to_string(),
            AppError::Database(msg) => {
                tracing::error!("Database error: {msg}");
                format!("Database error: {}", msg)
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                format!("Storage error: {}", msg)
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
