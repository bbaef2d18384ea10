use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::document::Document;
use crate::rendering::plain_text::to_plain_text;
use crate::rendering::reading_time::estimate_minutes;

/// Publication state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

/// Dates are BSON datetimes in MongoDB and RFC 3339 strings in JSON.
///
/// The driver's BSON (de)serializer is the only non-human-readable format
/// these records pass through.
mod stored_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    struct Stored(DateTime<Utc>);

    impl Serialize for Stored {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                self.0.serialize(serializer)
            } else {
                bson::DateTime::from_chrono(self.0).serialize(serializer)
            }
        }
    }

    impl<'de> Deserialize<'de> for Stored {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                DateTime::<Utc>::deserialize(deserializer).map(Stored)
            } else {
                bson::DateTime::deserialize(deserializer).map(|dt| Stored(dt.to_chrono()))
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        Stored(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Stored::deserialize(deserializer).map(|stored| stored.0)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.map(Stored).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Ok(Option::<Stored>::deserialize(deserializer)?.map(|stored| stored.0))
        }
    }
}

/// A blog post stored in MongoDB (`posts` collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    /// URL-safe unique slug (e.g. `hello-world`).
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// The rich-text body.
    pub content: Document,
    /// Plain text of `content`, for search. Only written together with it.
    #[serde(default)]
    pub content_plain: String,
    #[serde(default)]
    pub reading_time_minutes: u32,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default, with = "stored_datetime::option")]
    pub published_at: Option<DateTime<Utc>>,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub og_image: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    /// Bumped on every write; used for compare-and-swap updates.
    #[serde(default)]
    pub revision: u64,
    #[serde(with = "stored_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "stored_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Build a new post with a fresh id and derived fields computed from
    /// `content`.
    pub fn new(slug: String, title: String, content: Document) -> Self {
        let now = Utc::now();
        let mut post = Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug,
            title,
            description: String::new(),
            content: Document::empty(),
            content_plain: String::new(),
            reading_time_minutes: 0,
            status: PostStatus::Draft,
            published_at: None,
            tags: Vec::new(),
            category: String::new(),
            cover_image: String::new(),
            og_image: String::new(),
            view_count: 0,
            like_count: 0,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        post.set_content(ContentChange::new(content));
        post
    }

    pub fn set_content(&mut self, change: ContentChange) {
        self.content = change.content;
        self.content_plain = change.content_plain;
        self.reading_time_minutes = change.reading_time_minutes;
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// A replacement body together with the fields derived from it.
///
/// The only way to change a post's content, so plain text and reading time
/// can never be written for a different tree than the one stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
    content: Document,
    content_plain: String,
    reading_time_minutes: u32,
}

impl ContentChange {
    pub fn new(content: Document) -> Self {
        let content_plain = to_plain_text(&content);
        let reading_time_minutes = estimate_minutes(&content_plain);
        Self {
            content,
            content_plain,
            reading_time_minutes,
        }
    }

    pub fn content(&self) -> &Document {
        &self.content
    }

    pub fn content_plain(&self) -> &str {
        &self.content_plain
    }

    pub fn reading_time_minutes(&self) -> u32 {
        self.reading_time_minutes
    }
}

/// A partial update of a post. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<ContentChange>,
    pub status: Option<PostStatus>,
    /// `Some(None)` clears the publication date.
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub cover_image: Option<String>,
    pub og_image: Option<String>,
}

impl PostChanges {
    /// Apply the changes in memory. Revision and `updated_at` are left to the
    /// caller.
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(slug) = &self.slug {
            post.slug = slug.clone();
        }
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(description) = &self.description {
            post.description = description.clone();
        }
        if let Some(content) = &self.content {
            post.set_content(content.clone());
        }
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(published_at) = self.published_at {
            post.published_at = published_at;
        }
        if let Some(tags) = &self.tags {
            post.tags = tags.clone();
        }
        if let Some(category) = &self.category {
            post.category = category.clone();
        }
        if let Some(cover_image) = &self.cover_image {
            post.cover_image = cover_image.clone();
        }
        if let Some(og_image) = &self.og_image {
            post.og_image = og_image.clone();
        }
    }
}

/// Derived fields reported back after a document save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDocument {
    pub content_plain: String,
    pub reading_time_minutes: u32,
    pub revision: u64,
}

/// Sort order for post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSort {
    /// Admin list: most recently edited first.
    #[default]
    UpdatedDesc,
    /// Public list: most recently published first.
    PublishedDesc,
}

/// Filters and pagination for post listings.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub status: Option<PostStatus>,
    /// Case-insensitive substring over title, description and plain text.
    pub q: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    /// 1-based page number.
    pub page: u64,
    pub limit: u64,
    pub sort: PostSort,
}

impl PostQuery {
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1) * self.limit
    }

    /// In-memory equivalent of the MongoDB filter.
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(status) = self.status {
            if post.status != status {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !post.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &post.category != category {
                return false;
            }
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            let hit = [&post.title, &post.description, &post.content_plain]
                .iter()
                .any(|field| field.to_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// One page of posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl PostPage {
    pub fn has_next(&self) -> bool {
        self.page.saturating_sub(1) * self.limit + (self.posts.len() as u64) < self.total
    }
}

/// A tag used by published posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub post_count: u64,
}

/// Request payload for creating a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
}

/// Request payload for a partial post update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replaces the whole body when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    /// When set, the write only succeeds if the stored revision matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusRequest {
    pub status: PostStatus,
}

/// Moderation state of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    #[default]
    Approved,
}

/// A reader comment (`comments` collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub post_id: String,
    pub author_name: String,
    pub author_email: String,
    pub body: String,
    pub status: CommentStatus,
    #[serde(with = "stored_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A comment as shown to readers; the author's email stays private.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicComment {
    #[serde(rename = "_id")]
    pub id: String,
    pub author_name: String,
    pub body: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for PublicComment {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            author_name: comment.author_name,
            body: comment.body,
            status: comment.status,
            created_at: comment.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub author_name: String,
    pub author_email: String,
    pub body: String,
}

/// A reader's like (`likes` collection), unique per post and fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub post_id: String,
    pub fingerprint: String,
    #[serde(with = "stored_datetime")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{Mark, Node};

    fn sample_doc() -> Document {
        Document::new(vec![
            Node::paragraph(vec![Node::marked("Hi", [Mark::Bold])]),
            Node::paragraph(vec![Node::text("World")]),
        ])
    }

    #[test]
    fn test_new_post_derives_fields() {
        let post = Post::new("hello".into(), "Hello".into(), sample_doc());
        assert_eq!(post.content_plain, "Hi World");
        assert_eq!(post.reading_time_minutes, 1);
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.revision, 0);
        assert!(post.published_at.is_none());
    }

    #[test]
    fn test_empty_draft() {
        let post = Post::new("hello".into(), "Hello".into(), Document::empty());
        assert_eq!(post.content_plain, "");
        assert_eq!(post.reading_time_minutes, 0);
    }

    #[test]
    fn test_changes_replace_content_and_derived_fields() {
        let mut post = Post::new("hello".into(), "Hello".into(), sample_doc());
        let changes = PostChanges {
            title: Some("Renamed".into()),
            content: Some(ContentChange::new(Document::empty())),
            ..Default::default()
        };
        changes.apply_to(&mut post);

        assert_eq!(post.title, "Renamed");
        assert!(post.content.is_empty());
        assert_eq!(post.content_plain, "");
        assert_eq!(post.reading_time_minutes, 0);
    }

    #[test]
    fn test_changes_clear_published_at() {
        let mut post = Post::new("hello".into(), "Hello".into(), sample_doc());
        post.status = PostStatus::Published;
        post.published_at = Some(Utc::now());

        PostChanges {
            status: Some(PostStatus::Draft),
            published_at: Some(None),
            ..Default::default()
        }
        .apply_to(&mut post);

        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.published_at.is_none());
    }

    #[test]
    fn test_post_serialization_roundtrip() {
        let post = Post::new("hello".into(), "Hello".into(), sample_doc());
        let json = serde_json::to_string(&post).unwrap();
        assert!(json.contains("\"_id\""));
        assert!(json.contains("\"status\":\"draft\""));

        let back: Post = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, post.content);
        assert_eq!(back.content_plain, "Hi World");
    }

    #[test]
    fn test_post_dates_are_bson_datetimes_in_storage() {
        use bson::RawBsonRef;
        use chrono::TimeZone;

        let mut post = Post::new("hello".into(), "Hello".into(), sample_doc());
        let published = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        post.published_at = Some(published);

        let raw = bson::to_raw_document_buf(&post).unwrap();
        for field in ["published_at", "created_at", "updated_at"] {
            assert!(
                matches!(raw.get(field).unwrap(), Some(RawBsonRef::DateTime(_))),
                "{field} not stored as a datetime"
            );
        }
        let back: Post = bson::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(back.published_at, Some(published));

        post.published_at = None;
        let raw = bson::to_raw_document_buf(&post).unwrap();
        assert!(matches!(raw.get("published_at").unwrap(), Some(RawBsonRef::Null)));
        let back: Post = bson::from_slice(raw.as_bytes()).unwrap();
        assert!(back.published_at.is_none());

        let json = serde_json::to_value(&Post {
            published_at: Some(published),
            ..post
        })
        .unwrap();
        assert_eq!(json["published_at"], "2024-05-01T12:00:00Z");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn test_update_request_skips_absent_fields() {
        let req = UpdatePostRequest {
            title: Some("Hello".into()),
            content: Some(Document::empty()),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "title": "Hello", "content": { "type": "doc", "content": [] } })
        );
    }

    #[test]
    fn test_query_matches() {
        let mut post = Post::new("rust".into(), "Learning Rust".into(), sample_doc());
        post.status = PostStatus::Published;
        post.tags = vec!["Rust".into()];
        post.category = "code".into();

        let query = PostQuery {
            status: Some(PostStatus::Published),
            q: Some("world".into()),
            tag: Some("rust".into()),
            category: Some("code".into()),
            page: 1,
            limit: 10,
            sort: PostSort::PublishedDesc,
        };
        assert!(query.matches(&post));

        let miss = PostQuery {
            q: Some("python".into()),
            ..query.clone()
        };
        assert!(!miss.matches(&post));

        let drafts = PostQuery {
            status: Some(PostStatus::Draft),
            ..query
        };
        assert!(!drafts.matches(&post));
    }

    #[test]
    fn test_query_skip() {
        let query = PostQuery {
            page: 3,
            limit: 10,
            ..Default::default()
        };
        assert_eq!(query.skip(), 20);
        assert_eq!(PostQuery::default().skip(), 0);
    }
}
