use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{AppError, UploadError};
use crate::storage::client::{StorageClient, ALLOWED_IMAGE_TYPES};

/// Key prefix for uploaded images in the bucket.
const KEY_PREFIX: &str = "blog";

/// Response from a successful image upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Where the image can be fetched from.
    pub url: String,
}

/// An image file pulled out of the multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

fn sanitize_file_name(file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('.').is_empty() {
        "image".to_string()
    } else {
        sanitized
    }
}

/// Check an uploaded file and store it.
///
/// `storage` is `None` when no bucket is configured.
pub async fn process_upload(
    storage: Option<&dyn StorageClient>,
    config: &AppConfig,
    file: UploadedFile,
) -> Result<UploadResponse, AppError> {
    let storage = storage.ok_or(UploadError::Unconfigured)?;

    if file.data.len() > config.upload_max_bytes {
        return Err(UploadError::TooLarge {
            max_bytes: config.upload_max_bytes,
        }
        .into());
    }
    if !ALLOWED_IMAGE_TYPES.contains(&file.content_type.as_str()) {
        return Err(UploadError::InvalidType(file.content_type).into());
    }

    let name = format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(&file.file_name)
    );
    let key = format!("{KEY_PREFIX}/{name}");

    storage
        .put_object(&key, file.data, &file.content_type)
        .await?;
    tracing::info!(key = %key, "Stored uploaded image");

    Ok(UploadResponse {
        url: config.image_url(&key, &name),
    })
}

/// Content type for an image name, from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Axum handler for `POST /api/admin/upload`.
///
/// Accepts a multipart form with a single file field named "file".
#[cfg(feature = "ssr")]
pub async fn upload_image_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    mut multipart: axum::extract::Multipart,
) -> Result<axum::Json<UploadResponse>, AppError> {
    use axum::http::StatusCode;

    if state.storage_client.is_none() {
        return Err(UploadError::Unconfigured.into());
    }

    let too_large = |e: axum::extract::multipart::MultipartError| -> AppError {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge {
                max_bytes: state.config.upload_max_bytes,
            }
            .into()
        } else {
            AppError::BadRequest(format!("Multipart error: {e}"))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(too_large)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(too_large)?;

        let file = UploadedFile {
            file_name,
            content_type,
            data: data.to_vec(),
        };
        let response =
            process_upload(state.storage_client.as_deref(), &state.config, file).await?;

        return Ok(axum::Json(response));
    }

    Err(UploadError::NoFile.into())
}

/// Axum handler for `GET /api/images/{name}`.
///
/// Serves an uploaded image from storage.
#[cfg(feature = "ssr")]
pub async fn serve_image_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;

    let storage = state
        .storage_client
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Image not found".into()))?;

    if name.contains('/') || name.contains("..") {
        return Err(AppError::NotFound("Image not found".into()));
    }

    let object = storage
        .get_object(&format!("{KEY_PREFIX}/{name}"))
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".into()))?;

    let content_type = object
        .content_type
        .filter(|ct| ALLOWED_IMAGE_TYPES.contains(&ct.as_str()))
        .unwrap_or_else(|| content_type_for(&name).to_string());

    Ok((
        [
            (axum::http::header::CONTENT_TYPE, content_type),
            (
                axum::http::header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        object.content,
    )
        .into_response())
}
