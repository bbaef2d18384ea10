use thiserror::Error;

/// Application-wide error types.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A write lost a race: slug already taken or a stale revision.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another post already uses the requested slug.
    #[error("Slug already in use: {0}")]
    SlugExists(String),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons an image upload is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("File too large (max {max_bytes} bytes)")]
    TooLarge { max_bytes: usize },

    #[error("Invalid file type '{0}'. Use JPEG, PNG, GIF, or WebP.")]
    InvalidType(String),

    #[error("No file provided")]
    NoFile,

    #[error("Image upload not configured")]
    Unconfigured,
}

impl AppError {
    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::SlugExists(_) => "SLUG_EXISTS",
            AppError::Upload(UploadError::TooLarge { .. }) => "FILE_TOO_LARGE",
            AppError::Upload(UploadError::InvalidType(_)) => "INVALID_TYPE",
            AppError::Upload(UploadError::NoFile) => "NO_FILE",
            AppError::Upload(UploadError::Unconfigured) => "UPLOAD_NOT_CONFIGURED",
            AppError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

/// Helper conversion from anyhow::Error
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
