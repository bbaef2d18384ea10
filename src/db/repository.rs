use async_trait::async_trait;

use crate::db::models::{
    ContentChange, Post, PostChanges, PostPage, PostQuery, SavedDocument, TagCount,
};
use crate::error::AppError;
use crate::models::document::Document;

/// Repository trait for post operations.
///
/// This trait allows mocking the database layer in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a new post. A taken slug is `SlugExists`.
    async fn insert(&self, post: Post) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, AppError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, AppError>;

    /// List posts matching the query, one page at a time.
    async fn list(&self, query: &PostQuery) -> Result<PostPage, AppError>;

    /// Apply a partial update in a single write, bumping `revision` and
    /// `updated_at`.
    ///
    /// With `expected_revision`, the write only lands if the stored revision
    /// still matches (`Conflict` otherwise). A missing post is `NotFound`;
    /// updates never create posts.
    async fn update(
        &self,
        id: &str,
        changes: PostChanges,
        expected_revision: Option<u64>,
    ) -> Result<Post, AppError>;

    /// Remove a post. Returns `false` if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Increment the view counter of a published post.
    async fn increment_views(&self, slug: &str) -> Result<Option<u64>, AppError>;

    /// Increment the like counter and return the new value.
    async fn increment_likes(&self, id: &str) -> Result<u64, AppError>;

    /// Tags of published posts with their post counts, sorted by name.
    ///
    /// Tags differing only in ASCII case count as one, reported lowercased.
    async fn tag_counts(&self) -> Result<Vec<TagCount>, AppError>;

    /// Fetch the document tree of a post.
    async fn load_document(&self, id: &str) -> Result<Document, AppError> {
        self.find_by_id(id)
            .await?
            .map(|post| post.content)
            .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", id)))
    }

    /// Replace the document tree of a post.
    ///
    /// Plain text and reading time are recomputed from `doc` and written in
    /// the same update.
    async fn save_document(
        &self,
        id: &str,
        doc: Document,
        expected_revision: Option<u64>,
    ) -> Result<SavedDocument, AppError> {
        let changes = PostChanges {
            content: Some(ContentChange::new(doc)),
            ..Default::default()
        };
        let post = self.update(id, changes, expected_revision).await?;
        Ok(SavedDocument {
            content_plain: post.content_plain,
            reading_time_minutes: post.reading_time_minutes,
            revision: post.revision,
        })
    }
}

/// MongoDB implementation of the PostRepository.
///
/// This is only available when the `ssr` feature is enabled (i.e., server-side).
#[cfg(feature = "ssr")]
pub struct MongoPostRepository {
    collection: mongodb::Collection<Post>,
}

#[cfg(feature = "ssr")]
impl MongoPostRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("posts"),
        }
    }

    /// Create the unique slug index and the listing indexes.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use mongodb::bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "slug": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "status": 1, "published_at": -1 })
                .build(),
            IndexModel::builder().keys(doc! { "tags": 1 }).build(),
        ];

        self.collection
            .create_indexes(indexes)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_filter(query: &PostQuery) -> mongodb::bson::Document {
        use mongodb::bson::doc;

        let mut filter = doc! {};
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }
        if let Some(tag) = &query.tag {
            filter.insert(
                "tags",
                doc! { "$regex": format!("^{}$", escape_regex(tag)), "$options": "i" },
            );
        }
        if let Some(category) = &query.category {
            filter.insert("category", category.as_str());
        }
        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = escape_regex(q);
            filter.insert(
                "$or",
                vec![
                    doc! { "title": { "$regex": &pattern, "$options": "i" } },
                    doc! { "description": { "$regex": &pattern, "$options": "i" } },
                    doc! { "content_plain": { "$regex": &pattern, "$options": "i" } },
                ],
            );
        }
        filter
    }

    fn build_set(changes: &PostChanges) -> Result<mongodb::bson::Document, AppError> {
        use mongodb::bson::{to_bson, Bson};

        let encode = |value: Result<Bson, mongodb::bson::ser::Error>| {
            value.map_err(|e| AppError::Internal(format!("Failed to encode post field: {e}")))
        };

        let mut set = mongodb::bson::Document::new();
        if let Some(slug) = &changes.slug {
            set.insert("slug", slug.as_str());
        }
        if let Some(title) = &changes.title {
            set.insert("title", title.as_str());
        }
        if let Some(description) = &changes.description {
            set.insert("description", description.as_str());
        }
        if let Some(content) = &changes.content {
            set.insert("content", encode(to_bson(content.content()))?);
            set.insert("content_plain", content.content_plain());
            set.insert(
                "reading_time_minutes",
                encode(to_bson(&content.reading_time_minutes()))?,
            );
        }
        if let Some(status) = changes.status {
            set.insert("status", status.as_str());
        }
        if let Some(published_at) = changes.published_at {
            let value = match published_at {
                Some(at) => Bson::DateTime(mongodb::bson::DateTime::from_chrono(at)),
                None => Bson::Null,
            };
            set.insert("published_at", value);
        }
        if let Some(tags) = &changes.tags {
            set.insert("tags", tags.clone());
        }
        if let Some(category) = &changes.category {
            set.insert("category", category.as_str());
        }
        if let Some(cover_image) = &changes.cover_image {
            set.insert("cover_image", cover_image.as_str());
        }
        if let Some(og_image) = &changes.og_image {
            set.insert("og_image", og_image.as_str());
        }
        set.insert(
            "updated_at",
            mongodb::bson::DateTime::from_chrono(chrono::Utc::now()),
        );
        Ok(set)
    }
}

/// Escape a user string for use inside a MongoDB `$regex`.
#[cfg(feature = "ssr")]
fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(feature = "ssr")]
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == 11000
    )
}

#[cfg(feature = "ssr")]
#[async_trait]
impl PostRepository for MongoPostRepository {
    async fn insert(&self, post: Post) -> Result<(), AppError> {
        self.collection.insert_one(&post).await.map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::SlugExists(post.slug.clone())
            } else {
                AppError::Database(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "slug": slug })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list(&self, query: &PostQuery) -> Result<PostPage, AppError> {
        use futures::TryStreamExt;
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        use crate::db::models::PostSort;

        let filter = Self::build_filter(query);
        let sort = match query.sort {
            PostSort::UpdatedDesc => doc! { "updated_at": -1 },
            PostSort::PublishedDesc => doc! { "published_at": -1 },
        };
        let options = FindOptions::builder()
            .sort(sort)
            .skip(query.skip())
            .limit(query.limit as i64)
            .build();

        let total = self
            .collection
            .count_documents(filter.clone())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let posts: Vec<Post> = self
            .collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(PostPage {
            posts,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn update(
        &self,
        id: &str,
        changes: PostChanges,
        expected_revision: Option<u64>,
    ) -> Result<Post, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let mut filter = doc! { "_id": id };
        if let Some(revision) = expected_revision {
            filter.insert("revision", revision as i64);
        }
        let update = doc! {
            "$set": Self::build_set(&changes)?,
            "$inc": { "revision": 1_i64 },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::SlugExists(changes.slug.clone().unwrap_or_default())
                } else {
                    AppError::Database(e.to_string())
                }
            })?;

        match updated {
            Some(post) => Ok(post),
            None => {
                let exists = self
                    .collection
                    .count_documents(doc! { "_id": id })
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?
                    > 0;
                if exists {
                    Err(AppError::Conflict(format!(
                        "Post '{}' was modified by another save",
                        id
                    )))
                } else {
                    Err(AppError::NotFound(format!("Post '{}' not found", id)))
                }
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        use mongodb::bson::doc;

        let result = self
            .collection
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.deleted_count > 0)
    }

    async fn increment_views(&self, slug: &str) -> Result<Option<u64>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let post = self
            .collection
            .find_one_and_update(
                doc! { "slug": slug, "status": "published" },
                doc! { "$inc": { "view_count": 1_i64 } },
            )
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(post.map(|p| p.view_count))
    }

    async fn increment_likes(&self, id: &str) -> Result<u64, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$inc": { "like_count": 1_i64 } },
            )
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(|p| p.like_count)
            .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", id)))
    }

    async fn tag_counts(&self) -> Result<Vec<TagCount>, AppError> {
        use futures::TryStreamExt;
        use mongodb::bson::doc;

        use crate::db::models::PostStatus;

        #[derive(serde::Deserialize)]
        struct TagGroup {
            #[serde(rename = "_id")]
            name: String,
            post_count: u64,
        }

        let pipeline = vec![
            doc! { "$match": { "status": PostStatus::Published.as_str() } },
            doc! { "$unwind": "$tags" },
            doc! { "$group": { "_id": { "$toLower": "$tags" }, "post_count": { "$sum": 1_i64 } } },
            doc! { "$sort": { "_id": 1 } },
        ];

        let groups: Vec<TagGroup> = self
            .collection
            .aggregate(pipeline)
            .with_type::<TagGroup>()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(groups
            .into_iter()
            .map(|group| TagCount {
                name: group.name,
                post_count: group.post_count,
            })
            .collect())
    }
}
