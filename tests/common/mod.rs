use std::sync::Arc;

use axum::Router;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::minio::MinIO;
use testcontainers_modules::mongo::Mongo;

use quillpost::app::{build_router, AppState};
use quillpost::config::AppConfig;
use quillpost::db::engagement_repository::{EngagementRepository, MongoEngagementRepository};
use quillpost::db::repository::{MongoPostRepository, PostRepository};
use quillpost::pages::Pages;
use quillpost::storage::client::{S3StorageClient, StorageClient};

pub const ADMIN_PASSWORD: &str = "test-password";

/// Holds running containers and provides the Axum router for integration tests.
///
/// Containers are kept alive for as long as this struct lives. When dropped,
/// containers are stopped and cleaned up automatically.
pub struct TestEnv {
    _mongo: ContainerAsync<Mongo>,
    _minio: ContainerAsync<MinIO>,
    pub state: AppState,
    pub router: Router,
    pub posts: Arc<dyn PostRepository>,
    pub storage: Arc<dyn StorageClient>,
}

impl TestEnv {
    /// Spin up MongoDB and MinIO and build the full router against them.
    pub async fn start() -> Self {
        Self::start_with(&[]).await
    }

    /// Like [`TestEnv::start`], with extra configuration overrides.
    pub async fn start_with(overrides: &[(&str, &str)]) -> Self {
        let (mongo_container, minio_container) =
            tokio::join!(Mongo::default().start(), MinIO::default().start());
        let mongo_container = mongo_container.expect("Failed to start MongoDB container");
        let minio_container = minio_container.expect("Failed to start MinIO container");

        // --- MongoDB ---
        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let mongo_uri = format!("mongodb://127.0.0.1:{}", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let mongo_db = mongo_client.database("quillpost_test");

        let post_repo = MongoPostRepository::new(&mongo_db);
        post_repo
            .ensure_indexes()
            .await
            .expect("Failed to create post indexes");
        let engagement_repo = MongoEngagementRepository::new(&mongo_db);
        engagement_repo
            .ensure_indexes()
            .await
            .expect("Failed to create engagement indexes");
        let posts: Arc<dyn PostRepository> = Arc::new(post_repo);
        let engagement: Arc<dyn EngagementRepository> = Arc::new(engagement_repo);

        // --- MinIO (S3) ---
        let minio_port = minio_container
            .get_host_port_ipv4(9000)
            .await
            .expect("Failed to get MinIO port");
        let minio_endpoint = format!("http://127.0.0.1:{}", minio_port);

        // Set env vars for AWS SDK to pick up MinIO credentials
        unsafe {
            std::env::set_var("AWS_ACCESS_KEY_ID", "minioadmin");
            std::env::set_var("AWS_SECRET_ACCESS_KEY", "minioadmin");
            std::env::set_var("AWS_REGION", "us-east-1");
        }

        let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .endpoint_url(&minio_endpoint)
            .region(aws_config::Region::new("us-east-1"))
            .load()
            .await;

        let s3_client = aws_sdk_s3::Client::from_conf(
            aws_sdk_s3::config::Builder::from(&s3_config)
                .force_path_style(true)
                .build(),
        );

        let bucket_name = "quillpost-test";
        let _ = s3_client.create_bucket().bucket(bucket_name).send().await;

        let storage: Arc<dyn StorageClient> =
            Arc::new(S3StorageClient::new(s3_client, bucket_name.to_string()));

        // --- Config ---
        let mut builder = AppConfig::defaults()
            .expect("Failed to build config defaults")
            .set_override("admin_password", ADMIN_PASSWORD)
            .expect("Failed to set admin password")
            .set_override("s3_bucket", bucket_name)
            .expect("Failed to set bucket");
        for (key, value) in overrides {
            builder = builder
                .set_override(*key, *value)
                .expect("Failed to apply config override");
        }
        let config: AppConfig = builder
            .build()
            .expect("Failed to build config")
            .try_deserialize()
            .expect("Failed to deserialize config");

        let state = AppState {
            posts: posts.clone(),
            engagement,
            storage_client: Some(storage.clone()),
            pages: Arc::new(Pages::new().expect("Failed to load templates")),
            config: Arc::new(config),
        };
        let router = build_router(state.clone());

        Self {
            _mongo: mongo_container,
            _minio: minio_container,
            state,
            router,
            posts,
            storage,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .build(self.router.clone())
    }

    /// Serve the router on a real local port and return its base URL.
    pub async fn listen(&self) -> url::Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .expect("Test server failed");
        });
        url::Url::parse(&format!("http://{addr}/")).expect("Invalid test server URL")
    }
}

/// Helper: log in so the admin cookie is saved on `server`.
pub async fn login(server: &axum_test::TestServer) {
    server
        .post("/api/admin/login")
        .json(&serde_json::json!({ "password": ADMIN_PASSWORD }))
        .await
        .assert_status_ok();
}

/// Helper: create a post through the admin API and return its JSON.
pub async fn create_post(
    server: &axum_test::TestServer,
    body: serde_json::Value,
) -> serde_json::Value {
    let response = server.post("/api/admin/posts").json(&body).await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json()
}

/// Helper: create a post and publish it.
pub async fn publish_post(server: &axum_test::TestServer, body: serde_json::Value) -> serde_json::Value {
    let post = create_post(server, body).await;
    let id = post["_id"].as_str().expect("post id");
    server
        .put(&format!("/api/admin/posts/{id}/status"))
        .json(&serde_json::json!({ "status": "published" }))
        .await
        .json()
}
