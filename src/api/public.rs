use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::engagement_repository::EngagementRepository;
use crate::db::models::{
    Comment, CommentStatus, CreateCommentRequest, Like, Post, PostPage, PostQuery, PostSort,
    PostStatus, PublicComment,
};
use crate::db::repository::PostRepository;
use crate::error::AppError;
use crate::rendering::html::render_html;

const DEFAULT_PUBLIC_LIMIT: u64 = 10;
const MAX_PUBLIC_LIMIT: u64 = 50;
const MAX_AUTHOR_NAME_LEN: usize = 200;
const MAX_COMMENT_LEN: usize = 5000;

/// Header carrying the reader's like fingerprint.
pub const FINGERPRINT_HEADER: &str = "x-fingerprint";
/// Cookie fallback for the like fingerprint.
pub const FINGERPRINT_COOKIE: &str = "like_fp";
const ANONYMOUS_FINGERPRINT: &str = "anonymous";

/// Query parameters for the public post list.
#[derive(Debug, Default, Deserialize)]
pub struct PublicListParams {
    pub q: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// A published post with its rendered body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishedPost {
    #[serde(flatten)]
    pub post: Post,
    pub html: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewResponse {
    pub view_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub like_count: u64,
}

/// Published posts, newest first.
pub async fn process_list_published(
    repo: &dyn PostRepository,
    params: PublicListParams,
) -> Result<PostPage, AppError> {
    let query = PostQuery {
        status: Some(PostStatus::Published),
        q: params.q,
        tag: params.tag,
        category: params.category,
        page: params.page.unwrap_or(1).max(1),
        limit: params
            .limit
            .unwrap_or(DEFAULT_PUBLIC_LIMIT)
            .clamp(1, MAX_PUBLIC_LIMIT),
        sort: PostSort::PublishedDesc,
    };
    repo.list(&query).await
}

/// Look up a published post. Drafts are reported as missing.
pub async fn find_published(repo: &dyn PostRepository, slug: &str) -> Result<Post, AppError> {
    repo.find_by_slug(slug)
        .await?
        .filter(Post::is_published)
        .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", slug)))
}

pub async fn process_get_published(
    repo: &dyn PostRepository,
    slug: &str,
) -> Result<PublishedPost, AppError> {
    let post = find_published(repo, slug).await?;
    let html = render_html(&post.content);
    Ok(PublishedPost { post, html })
}

pub async fn process_record_view(
    repo: &dyn PostRepository,
    slug: &str,
) -> Result<ViewResponse, AppError> {
    let view_count = repo
        .increment_views(slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", slug)))?;
    Ok(ViewResponse { view_count })
}

/// Like a post once per fingerprint. Repeated likes report the current count.
pub async fn process_like(
    repo: &dyn PostRepository,
    engagement: &dyn EngagementRepository,
    slug: &str,
    fingerprint: &str,
) -> Result<LikeResponse, AppError> {
    let post = find_published(repo, slug).await?;

    let like = Like {
        post_id: post.id.clone(),
        fingerprint: fingerprint.to_string(),
        created_at: Utc::now(),
    };
    if !engagement.add_like(like).await? {
        return Ok(LikeResponse {
            like_count: post.like_count,
        });
    }

    let like_count = repo.increment_likes(&post.id).await?;
    Ok(LikeResponse { like_count })
}

/// Pick the like fingerprint: header first, then cookie.
pub fn resolve_fingerprint(header: Option<&str>, cookie: Option<&str>) -> String {
    header
        .or(cookie)
        .map(str::trim)
        .filter(|fp| !fp.is_empty())
        .unwrap_or(ANONYMOUS_FINGERPRINT)
        .to_string()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn validate_comment(request: &CreateCommentRequest) -> Result<(), AppError> {
    let name_len = request.author_name.trim().chars().count();
    if name_len == 0 || name_len > MAX_AUTHOR_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Name must be between 1 and {MAX_AUTHOR_NAME_LEN} characters"
        )));
    }
    if !is_valid_email(request.author_email.trim()) {
        return Err(AppError::Validation("Email address is invalid".into()));
    }
    let body_len = request.body.trim().chars().count();
    if body_len == 0 || body_len > MAX_COMMENT_LEN {
        return Err(AppError::Validation(format!(
            "Comment must be between 1 and {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn process_add_comment(
    repo: &dyn PostRepository,
    engagement: &dyn EngagementRepository,
    slug: &str,
    request: CreateCommentRequest,
) -> Result<PublicComment, AppError> {
    let post = find_published(repo, slug).await?;
    validate_comment(&request)?;

    let comment = Comment {
        id: uuid::Uuid::new_v4().to_string(),
        post_id: post.id,
        author_name: request.author_name.trim().to_string(),
        author_email: request.author_email.trim().to_string(),
        body: request.body.trim().to_string(),
        status: CommentStatus::Approved,
        created_at: Utc::now(),
    };
    engagement.add_comment(comment.clone()).await?;
    tracing::info!(post = %slug, comment_id = %comment.id, "New comment");

    Ok(comment.into())
}

pub async fn process_list_comments(
    repo: &dyn PostRepository,
    engagement: &dyn EngagementRepository,
    slug: &str,
) -> Result<Vec<PublicComment>, AppError> {
    let post = find_published(repo, slug).await?;
    let comments = engagement.list_approved_comments(&post.id).await?;
    Ok(comments.into_iter().map(PublicComment::from).collect())
}

/// `GET /api/posts`
#[cfg(feature = "ssr")]
pub async fn list_published_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Query(params): axum::extract::Query<PublicListParams>,
) -> Result<axum::Json<PostPage>, AppError> {
    let page = process_list_published(state.posts.as_ref(), params).await?;
    Ok(axum::Json(page))
}

/// `GET /api/posts/{slug}`
#[cfg(feature = "ssr")]
pub async fn get_published_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(slug): axum::extract::Path<String>,
) -> Result<axum::Json<PublishedPost>, AppError> {
    let post = process_get_published(state.posts.as_ref(), &slug).await?;
    Ok(axum::Json(post))
}

/// `POST /api/posts/{slug}/view`
#[cfg(feature = "ssr")]
pub async fn record_view_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(slug): axum::extract::Path<String>,
) -> Result<axum::Json<ViewResponse>, AppError> {
    let response = process_record_view(state.posts.as_ref(), &slug).await?;
    Ok(axum::Json(response))
}

/// `POST /api/posts/{slug}/like`
#[cfg(feature = "ssr")]
pub async fn like_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(slug): axum::extract::Path<String>,
    headers: axum::http::HeaderMap,
    jar: axum_extra::extract::CookieJar,
) -> Result<axum::Json<LikeResponse>, AppError> {
    let header = headers
        .get(FINGERPRINT_HEADER)
        .and_then(|v| v.to_str().ok());
    let cookie = jar.get(FINGERPRINT_COOKIE).map(|c| c.value());
    let fingerprint = resolve_fingerprint(header, cookie);

    let response = process_like(
        state.posts.as_ref(),
        state.engagement.as_ref(),
        &slug,
        &fingerprint,
    )
    .await?;
    Ok(axum::Json(response))
}

/// `GET /api/posts/{slug}/comments`
#[cfg(feature = "ssr")]
pub async fn list_comments_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(slug): axum::extract::Path<String>,
) -> Result<axum::Json<Vec<PublicComment>>, AppError> {
    let comments =
        process_list_comments(state.posts.as_ref(), state.engagement.as_ref(), &slug).await?;
    Ok(axum::Json(comments))
}

/// `POST /api/posts/{slug}/comments`
#[cfg(feature = "ssr")]
pub async fn add_comment_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(slug): axum::extract::Path<String>,
    axum::Json(request): axum::Json<CreateCommentRequest>,
) -> Result<(axum::http::StatusCode, axum::Json<PublicComment>), AppError> {
    let comment = process_add_comment(
        state.posts.as_ref(),
        state.engagement.as_ref(),
        &slug,
        request,
    )
    .await?;
    Ok((axum::http::StatusCode::CREATED, axum::Json(comment)))
}
