use std::path::Path;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::error::AppError;

use crate::storage::client::DEFAULT_UPLOAD_MAX_BYTES;

/// Server configuration.
///
/// Layered from built-in defaults, an optional `quillpost.toml` and
/// `QUILLPOST_*` environment variables (e.g. `QUILLPOST_MONGODB_URI`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub site_addr: String,
    /// Public base URL used for absolute links in the feed and sitemap.
    pub site_url: String,
    pub site_title: String,
    pub site_description: String,
    /// Without a URI the server keeps posts in memory.
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    /// Without a bucket image uploads are refused as unconfigured.
    pub s3_bucket: Option<String>,
    /// Custom endpoint for MinIO / LocalStack.
    pub s3_endpoint: Option<String>,
    /// Public base URL of the bucket. Uploaded images are served through
    /// `/api/images/{name}` when absent.
    pub s3_public_url: Option<String>,
    pub admin_password: Option<String>,
    pub upload_max_bytes: usize,
    /// Mark the admin cookie `Secure`.
    pub secure_cookies: bool,
}

impl AppConfig {
    /// Builder pre-loaded with defaults, before any file or environment
    /// source.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("site_addr", "0.0.0.0:3000")?
            .set_default("site_url", "http://localhost:3000")?
            .set_default("site_title", "Blog")?
            .set_default(
                "site_description",
                "Personal and professional writing on technology, society, and ideas.",
            )?
            .set_default("mongodb_database", "quillpost")?
            .set_default("upload_max_bytes", DEFAULT_UPLOAD_MAX_BYTES as i64)?
            .set_default("secure_cookies", false)
    }

    /// Load the configuration. `file` overrides the default `quillpost.toml`
    /// lookup in the working directory.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("quillpost").required(false),
        };

        Self::defaults()?
            .add_source(file_source)
            .add_source(Environment::with_prefix("QUILLPOST"))
            .build()?
            .try_deserialize()
    }

    /// The admin password, ignoring an empty value.
    pub fn admin_password(&self) -> Option<&str> {
        self.admin_password.as_deref().filter(|p| !p.is_empty())
    }

    /// The parsed public base URL.
    pub fn site_url(&self) -> Result<Url, AppError> {
        Url::parse(&self.site_url)
            .map_err(|e| AppError::Internal(format!("Invalid site_url '{}': {e}", self.site_url)))
    }

    /// Public URL for an uploaded object.
    pub fn image_url(&self, key: &str, name: &str) -> String {
        match self.s3_public_url.as_deref().filter(|u| !u.is_empty()) {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("/api/images/{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_overrides(pairs: &[(&str, &str)]) -> AppConfig {
        let mut builder = AppConfig::defaults().unwrap();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = with_overrides(&[]);
        assert_eq!(config.site_addr, "0.0.0.0:3000");
        assert_eq!(config.site_url().unwrap().as_str(), "http://localhost:3000/");
        assert_eq!(config.site_title, "Blog");
        assert_eq!(config.mongodb_database, "quillpost");
        assert_eq!(config.upload_max_bytes, DEFAULT_UPLOAD_MAX_BYTES);
        assert!(config.mongodb_uri.is_none());
        assert!(config.s3_bucket.is_none());
        assert!(!config.secure_cookies);
    }

    #[test]
    fn test_invalid_site_url() {
        let config = with_overrides(&[("site_url", "not a url")]);
        assert!(matches!(config.site_url(), Err(AppError::Internal(_))));
    }

    #[test]
    fn test_empty_password_counts_as_unset() {
        assert_eq!(with_overrides(&[("admin_password", "")]).admin_password(), None);
        assert_eq!(
            with_overrides(&[("admin_password", "hunter2")]).admin_password(),
            Some("hunter2")
        );
    }

    #[test]
    fn test_image_url() {
        let proxied = with_overrides(&[]);
        assert_eq!(
            proxied.image_url("blog/1-cat.png", "1-cat.png"),
            "/api/images/1-cat.png"
        );

        let public = with_overrides(&[("s3_public_url", "https://cdn.example.com/")]);
        assert_eq!(
            public.image_url("blog/1-cat.png", "1-cat.png"),
            "https://cdn.example.com/blog/1-cat.png"
        );
    }
}
