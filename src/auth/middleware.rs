use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;

use crate::app::AppState;
use crate::auth::admin::{is_authorized, ADMIN_COOKIE};
use crate::error::AppError;

/// Gate for admin routes.
///
/// Answers 500 when no admin password is configured and 401 when the session
/// cookie is missing or stale.
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let password = state
        .config
        .admin_password()
        .ok_or_else(|| AppError::Internal("Admin password not configured".into()))?;

    let token = jar.get(ADMIN_COOKIE).map(|c| c.value());
    if !is_authorized(password, token) {
        tracing::debug!(path = %request.uri().path(), "Unauthorized admin request");
        return Err(AppError::Auth("Unauthorized".into()));
    }

    Ok(next.run(request).await)
}
