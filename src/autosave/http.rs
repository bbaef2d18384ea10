//! [`PostApi`] and [`ImageUploader`] over the admin HTTP API.

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::auth::admin::ADMIN_COOKIE;
use crate::autosave::coordinator::PostApi;
use crate::autosave::images::{ImageFile, ImageUploader};
use crate::db::models::{CreatePostRequest, Post, PostStatus, SetStatusRequest, UpdatePostRequest};
use crate::error::{AppError, UploadError};
use crate::storage::client::{ALLOWED_IMAGE_TYPES, DEFAULT_UPLOAD_MAX_BYTES};

/// Requests past this deadline fail with `Unavailable`.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    url: String,
}

/// Admin API client authenticated with a session token.
#[derive(Debug, Clone)]
pub struct HttpPostApi {
    http: reqwest::Client,
    base: Url,
    token: String,
    upload_max_bytes: usize,
}

fn http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))
}

impl HttpPostApi {
    pub fn new(base: Url, token: impl Into<String>) -> Result<Self, AppError> {
        Ok(Self {
            http: http_client()?,
            base,
            token: token.into(),
            upload_max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        })
    }

    /// Size limit checked before uploading; should match the server's.
    pub fn with_upload_max_bytes(mut self, max_bytes: usize) -> Self {
        self.upload_max_bytes = max_bytes;
        self
    }

    /// Log in with the admin password and keep the session token.
    pub async fn login(base: Url, password: &str) -> Result<Self, AppError> {
        let http = http_client()?;
        let url = join(&base, "api/admin/login")?;
        let response = http
            .post(url)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(send_error)?;
        let response = check(response, DEFAULT_UPLOAD_MAX_BYTES).await?;

        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_token)
            .ok_or_else(|| AppError::Auth("Login response carried no session cookie".into()))?;

        Ok(Self {
            http,
            base,
            token,
            upload_max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, AppError> {
        let url = join(&self.base, path)?;
        Ok(self
            .http
            .request(method, url)
            .header(COOKIE, format!("{ADMIN_COOKIE}={}", self.token)))
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, AppError> {
        let response = builder.send().await.map_err(send_error)?;
        let response = check(response, self.upload_max_bytes).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid response body: {e}")))
    }
}

fn join(base: &Url, path: &str) -> Result<Url, AppError> {
    base.join(path)
        .map_err(|e| AppError::BadRequest(format!("Invalid API URL: {e}")))
}

fn send_error(err: reqwest::Error) -> AppError {
    AppError::Unavailable(format!("Request failed: {err}"))
}

/// Value of the admin cookie in one `Set-Cookie` header, if present.
fn session_token(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name == ADMIN_COOKIE && !value.is_empty()).then(|| value.to_string())
}

async fn check(response: Response, upload_max_bytes: usize) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
        error: status.to_string(),
        code: String::new(),
    });
    Err(error_from_status(status, &body.code, body.error, upload_max_bytes))
}

/// Map an error response back onto the server's error type.
fn error_from_status(
    status: StatusCode,
    code: &str,
    message: String,
    upload_max_bytes: usize,
) -> AppError {
    match (status, code) {
        (StatusCode::NOT_FOUND, _) => AppError::NotFound(message),
        (StatusCode::CONFLICT, "SLUG_EXISTS") => AppError::SlugExists(message),
        (StatusCode::CONFLICT, _) => AppError::Conflict(message),
        (StatusCode::UNAUTHORIZED, _) => AppError::Auth(message),
        (StatusCode::FORBIDDEN, _) => AppError::Forbidden(message),
        (StatusCode::BAD_REQUEST, "FILE_TOO_LARGE") => UploadError::TooLarge {
            max_bytes: upload_max_bytes,
        }
        .into(),
        (StatusCode::BAD_REQUEST, "INVALID_TYPE") => UploadError::InvalidType(message).into(),
        (StatusCode::BAD_REQUEST, "NO_FILE") => UploadError::NoFile.into(),
        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR") => AppError::Validation(message),
        (StatusCode::BAD_REQUEST, _) => AppError::BadRequest(message),
        (StatusCode::PAYLOAD_TOO_LARGE, _) => UploadError::TooLarge {
            max_bytes: upload_max_bytes,
        }
        .into(),
        (StatusCode::SERVICE_UNAVAILABLE, "UPLOAD_NOT_CONFIGURED") => {
            UploadError::Unconfigured.into()
        }
        (StatusCode::SERVICE_UNAVAILABLE, _) => AppError::Unavailable(message),
        _ => AppError::Internal(message),
    }
}

#[async_trait]
impl PostApi for HttpPostApi {
    async fn create(&self, draft: CreatePostRequest) -> Result<Post, AppError> {
        let builder = self
            .request(reqwest::Method::POST, "api/admin/posts")?
            .json(&draft);
        self.send(builder).await
    }

    async fn update(&self, id: &str, changes: UpdatePostRequest) -> Result<Post, AppError> {
        let builder = self
            .request(reqwest::Method::PATCH, &format!("api/admin/posts/{id}"))?
            .json(&changes);
        self.send(builder).await
    }

    async fn set_status(&self, id: &str, status: PostStatus) -> Result<Post, AppError> {
        let builder = self
            .request(reqwest::Method::PUT, &format!("api/admin/posts/{id}/status"))?
            .json(&SetStatusRequest { status });
        self.send(builder).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let builder = self.request(reqwest::Method::DELETE, &format!("api/admin/posts/{id}"))?;
        let response = builder.send().await.map_err(send_error)?;
        check(response, self.upload_max_bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageUploader for HttpPostApi {
    async fn upload_image(&self, file: ImageFile) -> Result<String, AppError> {
        if file.data.len() > self.upload_max_bytes {
            return Err(UploadError::TooLarge {
                max_bytes: self.upload_max_bytes,
            }
            .into());
        }
        if !ALLOWED_IMAGE_TYPES.contains(&file.content_type.as_str()) {
            return Err(UploadError::InvalidType(file.content_type).into());
        }

        let part = reqwest::multipart::Part::bytes(file.data)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|e| AppError::BadRequest(format!("Invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let builder = self
            .request(reqwest::Method::POST, "api/admin/upload")?
            .multipart(form);
        let uploaded: UploadedImage = self.send(builder).await?;
        Ok(uploaded.url)
    }
}
