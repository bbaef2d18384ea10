use async_trait::async_trait;

use crate::db::models::{Comment, Like};
use crate::error::AppError;

/// Storage for reader likes and comments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    /// Record a like. Returns `false` when this fingerprint already liked the
    /// post.
    async fn add_like(&self, like: Like) -> Result<bool, AppError>;

    async fn add_comment(&self, comment: Comment) -> Result<(), AppError>;

    /// Approved comments of a post, oldest first.
    async fn list_approved_comments(&self, post_id: &str) -> Result<Vec<Comment>, AppError>;

    /// Remove every like and comment attached to a post.
    async fn delete_for_post(&self, post_id: &str) -> Result<(), AppError>;
}

#[cfg(feature = "ssr")]
pub struct MongoEngagementRepository {
    likes: mongodb::Collection<Like>,
    comments: mongodb::Collection<Comment>,
}

#[cfg(feature = "ssr")]
impl MongoEngagementRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            likes: db.collection("likes"),
            comments: db.collection("comments"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use mongodb::bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        self.likes
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "post_id": 1, "fingerprint": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.comments
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "post_id": 1, "created_at": 1 })
                    .build(),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(feature = "ssr")]
#[async_trait]
impl EngagementRepository for MongoEngagementRepository {
    async fn add_like(&self, like: Like) -> Result<bool, AppError> {
        use mongodb::error::{ErrorKind, WriteFailure};

        match self.likes.insert_one(&like).await {
            Ok(_) => Ok(true),
            Err(e) => match e.kind.as_ref() {
                ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000 => Ok(false),
                _ => Err(AppError::Database(e.to_string())),
            },
        }
    }

    async fn add_comment(&self, comment: Comment) -> Result<(), AppError> {
        self.comments
            .insert_one(&comment)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_approved_comments(&self, post_id: &str) -> Result<Vec<Comment>, AppError> {
        use futures::TryStreamExt;
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();

        self.comments
            .find(doc! { "post_id": post_id, "status": "approved" })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete_for_post(&self, post_id: &str) -> Result<(), AppError> {
        use mongodb::bson::doc;

        self.likes
            .delete_many(doc! { "post_id": post_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.comments
            .delete_many(doc! { "post_id": post_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
