use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::engagement_repository::EngagementRepository;
use crate::db::models::{
    ContentChange, CreatePostRequest, Post, PostChanges, PostPage, PostQuery, PostSort,
    PostStatus, UpdatePostRequest,
};
use crate::db::repository::PostRepository;
use crate::error::AppError;
use crate::models::document::Document;
use crate::rendering::slug::{slugify, MAX_SLUG_LEN};

const MAX_TITLE_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_CATEGORY_LEN: usize = 100;
const DEFAULT_ADMIN_LIMIT: u64 = 20;
const MAX_ADMIN_LIMIT: u64 = 100;

fn validate_title(title: &str) -> Result<(), AppError> {
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be between 1 and {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_max(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Image fields accept either nothing or an absolute URL.
fn validate_image_url(field: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() || url::Url::parse(value).is_ok() {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{field} must be a URL")))
    }
}

fn validate_requested_slug(slug: &str) -> Result<(), AppError> {
    let len = slug.chars().count();
    if len == 0 || len > MAX_SLUG_LEN {
        return Err(AppError::Validation(format!(
            "Slug must be between 1 and {MAX_SLUG_LEN} characters"
        )));
    }
    Ok(())
}

/// Trim tag names, dropping blanks and duplicates.
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !cleaned.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            cleaned.push(tag.to_string());
        }
    }
    cleaned
}

/// Status change plus the matching `published_at` update.
fn status_changes(post: &Post, status: PostStatus) -> PostChanges {
    let published_at = match status {
        PostStatus::Published if post.published_at.is_none() => Some(Some(Utc::now())),
        PostStatus::Published => None,
        PostStatus::Draft => Some(None),
    };
    PostChanges {
        status: Some(status),
        published_at,
        ..Default::default()
    }
}

async fn find_post(repo: &dyn PostRepository, id: &str) -> Result<Post, AppError> {
    repo.find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", id)))
}

/// Create a post from an editor draft.
pub async fn process_create_post(
    repo: &dyn PostRepository,
    request: CreatePostRequest,
) -> Result<Post, AppError> {
    validate_title(&request.title)?;
    if let Some(slug) = &request.slug {
        validate_requested_slug(slug)?;
    }
    let description = request.description.unwrap_or_default();
    validate_max("Description", &description, MAX_DESCRIPTION_LEN)?;
    let category = request.category.unwrap_or_default();
    validate_max("Category", &category, MAX_CATEGORY_LEN)?;
    let cover_image = request.cover_image.unwrap_or_default();
    validate_image_url("Cover image", &cover_image)?;
    let og_image = request.og_image.unwrap_or_default();
    validate_image_url("OG image", &og_image)?;

    let slug = match request.slug.as_deref().map(str::trim) {
        Some(slug) if !slug.is_empty() => slugify(slug),
        _ => slugify(&request.title),
    };

    if repo.find_by_slug(&slug).await?.is_some() {
        return Err(AppError::SlugExists(slug));
    }

    let mut post = Post::new(
        slug,
        request.title,
        request.content.unwrap_or_else(Document::empty),
    );
    post.description = description;
    post.category = category;
    post.cover_image = cover_image;
    post.og_image = og_image;
    post.tags = clean_tags(request.tags.unwrap_or_default());
    post.status = request.status.unwrap_or_default();
    if post.is_published() {
        post.published_at = Some(post.created_at);
    }

    repo.insert(post.clone()).await?;
    tracing::info!(post_id = %post.id, slug = %post.slug, "Created post");

    Ok(post)
}

/// Apply a partial update. Content is replaced wholesale, with its derived
/// fields, in the same write.
pub async fn process_update_post(
    repo: &dyn PostRepository,
    id: &str,
    request: UpdatePostRequest,
) -> Result<Post, AppError> {
    if let Some(title) = &request.title {
        validate_title(title)?;
    }
    if let Some(slug) = &request.slug {
        validate_requested_slug(slug)?;
    }
    if let Some(description) = &request.description {
        validate_max("Description", description, MAX_DESCRIPTION_LEN)?;
    }
    if let Some(category) = &request.category {
        validate_max("Category", category, MAX_CATEGORY_LEN)?;
    }
    if let Some(cover_image) = &request.cover_image {
        validate_image_url("Cover image", cover_image)?;
    }
    if let Some(og_image) = &request.og_image {
        validate_image_url("OG image", og_image)?;
    }

    let current = find_post(repo, id).await?;

    let mut changes = match request.status {
        Some(status) => status_changes(&current, status),
        None => PostChanges::default(),
    };

    if let Some(slug) = &request.slug {
        let slug = if slug.trim().is_empty() {
            slugify(request.title.as_deref().unwrap_or(&current.title))
        } else {
            slugify(slug)
        };
        if let Some(owner) = repo.find_by_slug(&slug).await? {
            if owner.id != current.id {
                return Err(AppError::SlugExists(slug));
            }
        }
        changes.slug = Some(slug);
    }

    changes.title = request.title;
    changes.description = request.description;
    changes.content = request.content.map(ContentChange::new);
    changes.tags = request.tags.map(clean_tags);
    changes.category = request.category;
    changes.cover_image = request.cover_image;
    changes.og_image = request.og_image;

    let post = repo.update(id, changes, request.expected_revision).await?;
    tracing::debug!(post_id = %post.id, revision = post.revision, "Updated post");

    Ok(post)
}

/// Publish or unpublish a post.
pub async fn process_set_status(
    repo: &dyn PostRepository,
    id: &str,
    status: PostStatus,
) -> Result<Post, AppError> {
    let current = find_post(repo, id).await?;
    let post = repo.update(id, status_changes(&current, status), None).await?;
    tracing::info!(post_id = %post.id, status = status.as_str(), "Changed post status");
    Ok(post)
}

/// Delete a post together with its comments and likes.
pub async fn process_delete_post(
    repo: &dyn PostRepository,
    engagement: &dyn EngagementRepository,
    id: &str,
) -> Result<(), AppError> {
    if !repo.delete(id).await? {
        return Err(AppError::NotFound(format!("Post '{}' not found", id)));
    }
    engagement.delete_for_post(id).await?;
    tracing::info!(post_id = %id, "Deleted post");
    Ok(())
}

/// Query parameters for the admin post list.
#[derive(Debug, Default, Deserialize)]
pub struct AdminListParams {
    pub status: Option<PostStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Admin post list, most recently edited first.
pub async fn process_list_posts(
    repo: &dyn PostRepository,
    params: AdminListParams,
) -> Result<PostPage, AppError> {
    let query = PostQuery {
        status: params.status,
        page: params.page.unwrap_or(1).max(1),
        limit: params
            .limit
            .unwrap_or(DEFAULT_ADMIN_LIMIT)
            .clamp(1, MAX_ADMIN_LIMIT),
        sort: PostSort::UpdatedDesc,
        ..Default::default()
    };
    repo.list(&query).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// `GET /api/admin/posts`
#[cfg(feature = "ssr")]
pub async fn list_posts_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Query(params): axum::extract::Query<AdminListParams>,
) -> Result<axum::Json<PostPage>, AppError> {
    let page = process_list_posts(state.posts.as_ref(), params).await?;
    Ok(axum::Json(page))
}

/// `POST /api/admin/posts`
#[cfg(feature = "ssr")]
pub async fn create_post_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::Json(request): axum::Json<CreatePostRequest>,
) -> Result<(axum::http::StatusCode, axum::Json<Post>), AppError> {
    let post = process_create_post(state.posts.as_ref(), request).await?;
    Ok((axum::http::StatusCode::CREATED, axum::Json(post)))
}

/// `GET /api/admin/posts/{id}`
#[cfg(feature = "ssr")]
pub async fn get_post_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<axum::Json<Post>, AppError> {
    let post = find_post(state.posts.as_ref(), &id).await?;
    Ok(axum::Json(post))
}

/// `PATCH /api/admin/posts/{id}`
#[cfg(feature = "ssr")]
pub async fn update_post_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
    axum::Json(request): axum::Json<UpdatePostRequest>,
) -> Result<axum::Json<Post>, AppError> {
    let post = process_update_post(state.posts.as_ref(), &id, request).await?;
    Ok(axum::Json(post))
}

/// `PUT /api/admin/posts/{id}/status`
#[cfg(feature = "ssr")]
pub async fn set_status_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
    axum::Json(request): axum::Json<crate::db::models::SetStatusRequest>,
) -> Result<axum::Json<Post>, AppError> {
    let post = process_set_status(state.posts.as_ref(), &id, request.status).await?;
    Ok(axum::Json(post))
}

/// `DELETE /api/admin/posts/{id}`
#[cfg(feature = "ssr")]
pub async fn delete_post_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<axum::Json<DeleteResponse>, AppError> {
    process_delete_post(state.posts.as_ref(), state.engagement.as_ref(), &id).await?;
    Ok(axum::Json(DeleteResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryEngagementRepository, MemoryPostRepository};
    use crate::db::models::{Comment, CommentStatus, Like};
    use crate::db::repository::MockPostRepository;
    use crate::models::document::Node;

    fn draft(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.to_string(),
            content: Some(Document::new(vec![Node::paragraph(vec![Node::text(
                "Hello world",
            )])])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let repo = MemoryPostRepository::new();

        let post = process_create_post(&repo, draft("Hello World!")).await.unwrap();

        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.published_at.is_none());
        assert_eq!(post.content_plain, "Hello world");
        assert_eq!(post.reading_time_minutes, 1);
    }

    #[tokio::test]
    async fn test_create_without_content_is_empty_doc() {
        let repo = MemoryPostRepository::new();
        let request = CreatePostRequest {
            title: "Empty".into(),
            ..Default::default()
        };

        let post = process_create_post(&repo, request).await.unwrap();
        assert!(post.content.is_empty());
        assert_eq!(post.reading_time_minutes, 0);
    }

    #[tokio::test]
    async fn test_create_published_sets_date() {
        let repo = MemoryPostRepository::new();
        let request = CreatePostRequest {
            status: Some(PostStatus::Published),
            ..draft("Live")
        };

        let post = process_create_post(&repo, request).await.unwrap();
        assert_eq!(post.published_at, Some(post.created_at));
    }

    #[tokio::test]
    async fn test_create_slug_collision() {
        let repo = MemoryPostRepository::new();
        process_create_post(&repo, draft("Same")).await.unwrap();

        match process_create_post(&repo, draft("Same")).await.unwrap_err() {
            AppError::SlugExists(slug) => assert_eq!(slug, "same"),
            other => panic!("Expected SlugExists, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_validation() {
        let repo = MemoryPostRepository::new();

        let empty_title = process_create_post(&repo, draft("")).await.unwrap_err();
        assert!(matches!(empty_title, AppError::Validation(_)));

        let long_title = process_create_post(&repo, draft(&"x".repeat(501)))
            .await
            .unwrap_err();
        assert!(matches!(long_title, AppError::Validation(_)));

        let bad_cover = CreatePostRequest {
            cover_image: Some("not a url".into()),
            ..draft("Cover")
        };
        match process_create_post(&repo, bad_cover).await.unwrap_err() {
            AppError::Validation(msg) => assert!(msg.contains("Cover image")),
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_replaces_content_and_derived_fields() {
        let repo = MemoryPostRepository::new();
        let post = process_create_post(&repo, draft("Doc")).await.unwrap();

        let body = "word ".repeat(400);
        let request = UpdatePostRequest {
            content: Some(Document::new(vec![Node::paragraph(vec![Node::text(
                body.trim(),
            )])])),
            ..Default::default()
        };
        let updated = process_update_post(&repo, &post.id, request).await.unwrap();

        assert_eq!(updated.reading_time_minutes, 2);
        assert_eq!(updated.content_plain, body.trim());
        assert_eq!(updated.title, "Doc");
        assert_eq!(updated.revision, post.revision + 1);
    }

    #[tokio::test]
    async fn test_update_blank_slug_falls_back_to_title() {
        let repo = MemoryPostRepository::new();
        let post = process_create_post(&repo, draft("Original")).await.unwrap();

        let request = UpdatePostRequest {
            slug: Some("   ".into()),
            title: Some("Brand New".into()),
            ..Default::default()
        };
        let updated = process_update_post(&repo, &post.id, request).await.unwrap();
        assert_eq!(updated.slug, "brand-new");
    }

    #[tokio::test]
    async fn test_update_slug_taken_by_other_post() {
        let repo = MemoryPostRepository::new();
        process_create_post(&repo, draft("First")).await.unwrap();
        let second = process_create_post(&repo, draft("Second")).await.unwrap();

        let request = UpdatePostRequest {
            slug: Some("First".into()),
            ..Default::default()
        };
        let err = process_update_post(&repo, &second.id, request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SLUG_EXISTS");
    }

    #[tokio::test]
    async fn test_update_own_slug_is_allowed() {
        let repo = MemoryPostRepository::new();
        let post = process_create_post(&repo, draft("Mine")).await.unwrap();

        let request = UpdatePostRequest {
            slug: Some("mine".into()),
            ..Default::default()
        };
        let updated = process_update_post(&repo, &post.id, request).await.unwrap();
        assert_eq!(updated.slug, "mine");
    }

    #[tokio::test]
    async fn test_update_stale_revision() {
        let repo = MemoryPostRepository::new();
        let post = process_create_post(&repo, draft("Rev")).await.unwrap();
        process_update_post(&repo, &post.id, UpdatePostRequest::default())
            .await
            .unwrap();

        let request = UpdatePostRequest {
            title: Some("Late".into()),
            expected_revision: Some(post.revision),
            ..Default::default()
        };
        match process_update_post(&repo, &post.id, request).await.unwrap_err() {
            AppError::Conflict(_) => {}
            other => panic!("Expected Conflict, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_missing_post() {
        let mut repo = MockPostRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));
        repo.expect_update().never();

        let err = process_update_post(&repo, "gone", UpdatePostRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_status_publish_and_revert() {
        let repo = MemoryPostRepository::new();
        let post = process_create_post(&repo, draft("Flip")).await.unwrap();

        let published = process_set_status(&repo, &post.id, PostStatus::Published)
            .await
            .unwrap();
        let first_date = published.published_at.expect("published_at set");

        let again = process_set_status(&repo, &post.id, PostStatus::Published)
            .await
            .unwrap();
        assert_eq!(again.published_at, Some(first_date));

        let reverted = process_set_status(&repo, &post.id, PostStatus::Draft)
            .await
            .unwrap();
        assert_eq!(reverted.status, PostStatus::Draft);
        assert!(reverted.published_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades_and_blocks_later_writes() {
        let repo = MemoryPostRepository::new();
        let engagement = MemoryEngagementRepository::new();
        let post = process_create_post(&repo, draft("Doomed")).await.unwrap();

        engagement
            .add_like(Like {
                post_id: post.id.clone(),
                fingerprint: "fp".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        engagement
            .add_comment(Comment {
                id: "c1".into(),
                post_id: post.id.clone(),
                author_name: "Ann".into(),
                author_email: "ann@example.com".into(),
                body: "Nice".into(),
                status: CommentStatus::Approved,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        process_delete_post(&repo, &engagement, &post.id).await.unwrap();

        assert!(repo.find_by_id(&post.id).await.unwrap().is_none());
        assert!(engagement
            .list_approved_comments(&post.id)
            .await
            .unwrap()
            .is_empty());

        let late_save = UpdatePostRequest {
            title: Some("Resurrected".into()),
            ..Default::default()
        };
        let err = process_update_post(&repo, &post.id, late_save)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(repo.find_by_id(&post.id).await.unwrap().is_none());

        let again = process_delete_post(&repo, &engagement, &post.id)
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let repo = MemoryPostRepository::new();
        for i in 0..3 {
            process_create_post(&repo, draft(&format!("Post {i}")))
                .await
                .unwrap();
        }

        let page = process_list_posts(
            &repo,
            AdminListParams {
                limit: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn test_clean_tags() {
        let tags = vec![" rust ".into(), "".into(), "Rust".into(), "web".into()];
        assert_eq!(clean_tags(tags), vec!["rust".to_string(), "web".to_string()]);
    }
}
