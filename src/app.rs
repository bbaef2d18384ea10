use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth;
use crate::config::AppConfig;
use crate::db::engagement_repository::{EngagementRepository, MongoEngagementRepository};
use crate::db::memory::{MemoryEngagementRepository, MemoryPostRepository};
use crate::db::repository::{MongoPostRepository, PostRepository};
use crate::error::AppError;
use crate::pages::{self, Pages};
use crate::storage::client::{S3StorageClient, StorageClient};

/// Multipart framing allowance on top of the configured image size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub posts: Arc<dyn PostRepository>,
    pub engagement: Arc<dyn EngagementRepository>,
    /// `None` when no bucket is configured.
    pub storage_client: Option<Arc<dyn StorageClient>>,
    pub pages: Arc<Pages>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connect the configured backends.
    pub async fn from_config(config: AppConfig) -> Result<Self, AppError> {
        let (posts, engagement): (Arc<dyn PostRepository>, Arc<dyn EngagementRepository>) =
            match config.mongodb_uri.as_deref().filter(|uri| !uri.is_empty()) {
                Some(uri) => {
                    let client = mongodb::Client::with_uri_str(uri)
                        .await
                        .map_err(|e| AppError::Database(e.to_string()))?;
                    let db = client.database(&config.mongodb_database);

                    let posts = MongoPostRepository::new(&db);
                    posts.ensure_indexes().await?;
                    let engagement = MongoEngagementRepository::new(&db);
                    engagement.ensure_indexes().await?;

                    tracing::info!(database = %config.mongodb_database, "Connected to MongoDB");
                    (Arc::new(posts), Arc::new(engagement))
                }
                None => {
                    tracing::warn!("No MongoDB URI configured, keeping posts in memory");
                    (
                        Arc::new(MemoryPostRepository::new()),
                        Arc::new(MemoryEngagementRepository::new()),
                    )
                }
            };

        let storage_client: Option<Arc<dyn StorageClient>> =
            match config.s3_bucket.as_deref().filter(|b| !b.is_empty()) {
                Some(bucket) => {
                    let client =
                        S3StorageClient::connect(bucket.to_string(), config.s3_endpoint.as_deref())
                            .await;
                    tracing::info!(bucket = %bucket, "S3 storage client initialized");
                    Some(Arc::new(client))
                }
                None => {
                    tracing::warn!("No S3 bucket configured, image uploads are disabled");
                    None
                }
            };

        Ok(Self {
            posts,
            engagement,
            storage_client,
            pages: Arc::new(Pages::new()?),
            config: Arc::new(config),
        })
    }
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.upload_max_bytes + MULTIPART_OVERHEAD;
    let gate = axum::middleware::from_fn_with_state(state.clone(), auth::middleware::require_admin);

    let admin_api = Router::new()
        .route("/me", get(auth::admin::me_handler))
        .route("/logout", post(auth::admin::logout_handler))
        .route(
            "/posts",
            get(api::posts::list_posts_handler).post(api::posts::create_post_handler),
        )
        .route(
            "/posts/{id}",
            get(api::posts::get_post_handler)
                .patch(api::posts::update_post_handler)
                .delete(api::posts::delete_post_handler),
        )
        .route("/posts/{id}/status", put(api::posts::set_status_handler))
        .route(
            "/upload",
            post(api::upload::upload_image_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(gate.clone())
        .route("/login", post(auth::admin::login_handler));

    let admin_pages = Router::new()
        .route("/preview/{id}", get(pages::preview_page))
        .route_layer(gate);

    Router::new()
        .route("/", get(pages::index_page))
        .route("/blog", get(pages::index_page))
        .route("/blog/{slug}", get(pages::post_page))
        .route("/tag/{tag}", get(pages::tag_page))
        .route("/feed.xml", get(api::feeds::feed_handler))
        .route("/sitemap.xml", get(api::feeds::sitemap_handler))
        .route("/api/tags", get(api::feeds::tags_handler))
        .route("/api/posts", get(api::public::list_published_handler))
        .route("/api/posts/{slug}", get(api::public::get_published_handler))
        .route("/api/posts/{slug}/view", post(api::public::record_view_handler))
        .route("/api/posts/{slug}/like", post(api::public::like_handler))
        .route(
            "/api/posts/{slug}/comments",
            get(api::public::list_comments_handler).post(api::public::add_comment_handler),
        )
        .route("/api/images/{name}", get(api::upload::serve_image_handler))
        .nest("/api/admin", admin_api)
        .nest("/admin", admin_pages)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
