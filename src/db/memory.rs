//! In-process repositories, used when no MongoDB URI is configured and by
//! unit tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::db::engagement_repository::EngagementRepository;
use crate::db::models::{
    Comment, CommentStatus, Like, Post, PostChanges, PostPage, PostQuery, PostSort, TagCount,
};
use crate::db::repository::PostRepository;
use crate::error::AppError;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("In-memory store lock poisoned".into()))
}

#[derive(Default)]
pub struct MemoryPostRepository {
    posts: Mutex<Vec<Post>>,
}

impl MemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn insert(&self, post: Post) -> Result<(), AppError> {
        let mut posts = lock(&self.posts)?;
        if posts.iter().any(|p| p.slug == post.slug) {
            return Err(AppError::SlugExists(post.slug));
        }
        posts.push(post);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, AppError> {
        Ok(lock(&self.posts)?.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, AppError> {
        Ok(lock(&self.posts)?.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list(&self, query: &PostQuery) -> Result<PostPage, AppError> {
        let posts = lock(&self.posts)?;
        let mut matching: Vec<Post> = posts.iter().filter(|p| query.matches(p)).cloned().collect();
        match query.sort {
            PostSort::UpdatedDesc => matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            PostSort::PublishedDesc => {
                matching.sort_by(|a, b| b.published_at.cmp(&a.published_at))
            }
        }
        let total = matching.len() as u64;
        let posts = matching
            .into_iter()
            .skip(query.skip() as usize)
            .take(query.limit as usize)
            .collect();
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
        let mut posts = lock(&self.posts)?;
        if let Some(slug) = &changes.slug {
            if posts.iter().any(|p| &p.slug == slug && p.id != id) {
                return Err(AppError::SlugExists(slug.clone()));
            }
        }
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", id)))?;
        if let Some(expected) = expected_revision {
            if post.revision != expected {
                return Err(AppError::Conflict(format!(
                    "Post '{}' was modified by another save",
                    id
                )));
            }
        }
        changes.apply_to(post);
        post.revision += 1;
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut posts = lock(&self.posts)?;
        let before = posts.len();
        posts.retain(|p| p.id != id);
        Ok(posts.len() < before)
    }

    async fn increment_views(&self, slug: &str) -> Result<Option<u64>, AppError> {
        let mut posts = lock(&self.posts)?;
        Ok(posts
            .iter_mut()
            .find(|p| p.slug == slug && p.is_published())
            .map(|p| {
                p.view_count += 1;
                p.view_count
            }))
    }

    async fn increment_likes(&self, id: &str) -> Result<u64, AppError> {
        let mut posts = lock(&self.posts)?;
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", id)))?;
        post.like_count += 1;
        Ok(post.like_count)
    }

    async fn tag_counts(&self) -> Result<Vec<TagCount>, AppError> {
        let posts = lock(&self.posts)?;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for post in posts.iter().filter(|p| p.is_published()) {
            for tag in &post.tags {
                *counts.entry(tag.to_ascii_lowercase()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(name, post_count)| TagCount { name, post_count })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryEngagementRepository {
    likes: Mutex<Vec<Like>>,
    comments: Mutex<Vec<Comment>>,
}

impl MemoryEngagementRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngagementRepository for MemoryEngagementRepository {
    async fn add_like(&self, like: Like) -> Result<bool, AppError> {
        let mut likes = lock(&self.likes)?;
        if likes
            .iter()
            .any(|l| l.post_id == like.post_id && l.fingerprint == like.fingerprint)
        {
            return Ok(false);
        }
        likes.push(like);
        Ok(true)
    }

    async fn add_comment(&self, comment: Comment) -> Result<(), AppError> {
        lock(&self.comments)?.push(comment);
        Ok(())
    }

    async fn list_approved_comments(&self, post_id: &str) -> Result<Vec<Comment>, AppError> {
        let mut comments: Vec<Comment> = lock(&self.comments)?
            .iter()
            .filter(|c| c.post_id == post_id && c.status == CommentStatus::Approved)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn delete_for_post(&self, post_id: &str) -> Result<(), AppError> {
        lock(&self.likes)?.retain(|l| l.post_id != post_id);
        lock(&self.comments)?.retain(|c| c.post_id != post_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ContentChange, PostStatus};
    use crate::models::document::{Document, Node};

    fn post(slug: &str) -> Post {
        Post::new(
            slug.into(),
            slug.to_uppercase(),
            Document::new(vec![Node::paragraph(vec![Node::text("Hello")])]),
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_slug() {
        let repo = MemoryPostRepository::new();
        repo.insert(post("a")).await.unwrap();

        match repo.insert(post("a")).await.unwrap_err() {
            AppError::SlugExists(slug) => assert_eq!(slug, "a"),
            other => panic!("Expected SlugExists, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_bumps_revision() {
        let repo = MemoryPostRepository::new();
        let p = post("a");
        let id = p.id.clone();
        repo.insert(p).await.unwrap();

        let updated = repo
            .update(
                &id,
                PostChanges {
                    title: Some("New".into()),
                    ..Default::default()
                },
                Some(0),
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.revision, 1);
    }

    #[tokio::test]
    async fn test_update_stale_revision_conflicts() {
        let repo = MemoryPostRepository::new();
        let p = post("a");
        let id = p.id.clone();
        repo.insert(p).await.unwrap();
        repo.update(&id, PostChanges::default(), None).await.unwrap();

        match repo.update(&id, PostChanges::default(), Some(0)).await.unwrap_err() {
            AppError::Conflict(_) => {}
            other => panic!("Expected Conflict, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_missing_post_never_creates() {
        let repo = MemoryPostRepository::new();

        match repo
            .update("ghost", PostChanges::default(), None)
            .await
            .unwrap_err()
        {
            AppError::NotFound(_) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
        assert!(repo.find_by_id("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_slug_taken_by_other_post() {
        let repo = MemoryPostRepository::new();
        let a = post("a");
        let a_id = a.id.clone();
        repo.insert(a).await.unwrap();
        repo.insert(post("b")).await.unwrap();

        let err = repo
            .update(
                &a_id,
                PostChanges {
                    slug: Some("b".into()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SLUG_EXISTS");
    }

    #[tokio::test]
    async fn test_save_document_recomputes_derived_fields() {
        let repo = MemoryPostRepository::new();
        let p = post("a");
        let id = p.id.clone();
        repo.insert(p).await.unwrap();

        let body = "word ".repeat(201);
        let saved = repo
            .save_document(
                &id,
                Document::new(vec![Node::paragraph(vec![Node::text(body.trim())])]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(saved.reading_time_minutes, 2);
        assert_eq!(saved.revision, 1);

        let stored = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.content_plain, saved.content_plain);
        assert_eq!(
            stored.content,
            repo.load_document(&id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_load_document_missing() {
        let repo = MemoryPostRepository::new();
        assert!(matches!(
            repo.load_document("nope").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let repo = MemoryPostRepository::new();
        for i in 0..5 {
            let mut p = post(&format!("p{i}"));
            p.status = PostStatus::Published;
            p.published_at = Some(Utc::now() + chrono::Duration::seconds(i));
            repo.insert(p).await.unwrap();
        }
        repo.insert(post("draft")).await.unwrap();

        let page = repo
            .list(&PostQuery {
                status: Some(PostStatus::Published),
                page: 2,
                limit: 2,
                sort: PostSort::PublishedDesc,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let slugs: Vec<_> = page.posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["p2", "p1"]);
    }

    #[tokio::test]
    async fn test_views_only_count_published() {
        let repo = MemoryPostRepository::new();
        let p = post("a");
        let id = p.id.clone();
        repo.insert(p).await.unwrap();
        assert_eq!(repo.increment_views("a").await.unwrap(), None);

        repo.update(
            &id,
            PostChanges {
                status: Some(PostStatus::Published),
                content: Some(ContentChange::new(Document::empty())),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(repo.increment_views("a").await.unwrap(), Some(1));
        assert_eq!(repo.increment_views("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_tag_counts_only_published() {
        let repo = MemoryPostRepository::new();
        for (slug, tags, published) in [
            ("a", vec!["rust", "web"], true),
            ("b", vec!["Rust"], true),
            ("c", vec!["draft-only", "rust"], false),
        ] {
            let mut p = post(slug);
            p.tags = tags.into_iter().map(String::from).collect();
            if published {
                p.status = PostStatus::Published;
                p.published_at = Some(Utc::now());
            }
            repo.insert(p).await.unwrap();
        }

        let counts = repo.tag_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                TagCount {
                    name: "rust".into(),
                    post_count: 2
                },
                TagCount {
                    name: "web".into(),
                    post_count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_likes_are_unique_per_fingerprint() {
        let repo = MemoryEngagementRepository::new();
        let like = || Like {
            post_id: "p".into(),
            fingerprint: "fp".into(),
            created_at: Utc::now(),
        };
        assert!(repo.add_like(like()).await.unwrap());
        assert!(!repo.add_like(like()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_for_post_removes_engagement() {
        let repo = MemoryEngagementRepository::new();
        repo.add_comment(Comment {
            id: "c1".into(),
            post_id: "p".into(),
            author_name: "Ann".into(),
            author_email: "ann@example.com".into(),
            body: "Nice".into(),
            status: CommentStatus::Approved,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        assert_eq!(repo.list_approved_comments("p").await.unwrap().len(), 1);

        repo.delete_for_post("p").await.unwrap();
        assert!(repo.list_approved_comments("p").await.unwrap().is_empty());
    }
}
