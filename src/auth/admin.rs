use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Name of the cookie carrying the admin session token.
pub const ADMIN_COOKIE: &str = "admin_auth";

/// How long an admin session lasts, in days.
pub const SESSION_DAYS: i64 = 30;

const TOKEN_SALT: &str = "blog-admin";

/// Session token for the configured admin password.
///
/// Hex-encoded SHA-256 of the password followed by a fixed salt, so the
/// cookie never carries the password itself.
pub fn admin_token(password: &str) -> String {
    let digest = Sha256::digest(format!("{password}{TOKEN_SALT}").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Whether `token` (the cookie value, if any) opens an admin session.
pub fn is_authorized(password: &str, token: Option<&str>) -> bool {
    match token {
        Some(token) => constant_time_eq(token.as_bytes(), admin_token(password).as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Login request body.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
}

#[cfg(feature = "ssr")]
fn session_cookie(
    token: String,
    secure: bool,
) -> axum_extra::extract::cookie::Cookie<'static> {
    axum_extra::extract::cookie::Cookie::build((ADMIN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .max_age(time::Duration::days(SESSION_DAYS))
        .build()
}

/// `POST /api/admin/login`
///
/// Checks the password and sets the session cookie.
#[cfg(feature = "ssr")]
pub async fn login_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    jar: axum_extra::extract::CookieJar,
    axum::Json(req): axum::Json<LoginRequest>,
) -> Result<(axum_extra::extract::CookieJar, axum::Json<SessionResponse>), crate::error::AppError> {
    use crate::error::AppError;

    let password = state
        .config
        .admin_password()
        .ok_or_else(|| AppError::Internal("Admin password not configured".into()))?;

    if req.password != password {
        tracing::warn!("Rejected admin login attempt");
        return Err(AppError::Auth("Invalid password".into()));
    }

    let jar = jar.add(session_cookie(admin_token(password), state.config.secure_cookies));

    Ok((jar, axum::Json(SessionResponse { authenticated: true })))
}

/// `POST /api/admin/logout`: clears the session cookie.
#[cfg(feature = "ssr")]
pub async fn logout_handler(
    jar: axum_extra::extract::CookieJar,
) -> (axum_extra::extract::CookieJar, axum::Json<SessionResponse>) {
    let cookie = axum_extra::extract::cookie::Cookie::build((ADMIN_COOKIE, ""))
        .path("/")
        .removal()
        .build();

    (
        jar.remove(cookie),
        axum::Json(SessionResponse {
            authenticated: false,
        }),
    )
}

/// `GET /api/admin/me`
///
/// Only reachable through the admin gate, so reaching it means the session is
/// valid.
#[cfg(feature = "ssr")]
pub async fn me_handler() -> axum::Json<SessionResponse> {
    axum::Json(SessionResponse {
        authenticated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_hex_sha256() {
        let token = admin_token("secret");
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token, admin_token("secret"));
        assert_ne!(token, admin_token("other"));
    }

    #[test]
    fn test_token_of_empty_salted_input() {
        // SHA-256("blog-admin") with an empty password.
        let expected: String = Sha256::digest(b"blog-admin")
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(admin_token(""), expected);
    }

    #[test]
    fn test_is_authorized() {
        let token = admin_token("secret");
        assert!(is_authorized("secret", Some(&token)));
        assert!(!is_authorized("secret", Some("nope")));
        assert!(!is_authorized("secret", None));
        assert!(!is_authorized("changed", Some(&token)));
    }
}
