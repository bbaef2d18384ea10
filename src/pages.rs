//! Server-rendered reader pages.
//!
//! The public post page and the admin draft preview share one template, so
//! both show the same rendered body for a given document.

use serde::Serialize;

use crate::db::models::{Post, PostPage, PublicComment};
use crate::error::AppError;
use crate::rendering::html::render_html;

const BASE_TEMPLATE: &str = include_str!("../templates/base.html");
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const POST_TEMPLATE: &str = include_str!("../templates/post.html");

/// Post fields exposed to templates.
#[derive(Debug, Serialize)]
struct PostView<'a> {
    slug: &'a str,
    title: &'a str,
    description: &'a str,
    og_image: &'a str,
    published_at: Option<String>,
    published_label: Option<String>,
    reading_time_minutes: u32,
    view_count: u64,
    like_count: u64,
    tags: &'a [String],
}

impl<'a> From<&'a Post> for PostView<'a> {
    fn from(post: &'a Post) -> Self {
        let og_image = if post.og_image.is_empty() {
            post.cover_image.as_str()
        } else {
            post.og_image.as_str()
        };
        Self {
            slug: &post.slug,
            title: &post.title,
            description: &post.description,
            og_image,
            published_at: post.published_at.map(|d| d.to_rfc3339()),
            published_label: post.published_at.map(|d| d.format("%B %-d, %Y").to_string()),
            reading_time_minutes: post.reading_time_minutes,
            view_count: post.view_count,
            like_count: post.like_count,
            tags: &post.tags,
        }
    }
}

/// Compiled page templates.
pub struct Pages {
    tera: tera::Tera,
}

fn template_error(e: tera::Error) -> AppError {
    AppError::Internal(format!("Template error: {e}"))
}

impl Pages {
    pub fn new() -> Result<Self, AppError> {
        let mut tera = tera::Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            ("index.html", INDEX_TEMPLATE),
            ("post.html", POST_TEMPLATE),
        ])
        .map_err(template_error)?;
        Ok(Self { tera })
    }

    /// The published post list, optionally narrowed to one tag.
    pub fn render_index(
        &self,
        page: &PostPage,
        q: Option<&str>,
        tag: Option<&str>,
    ) -> Result<String, AppError> {
        let posts: Vec<PostView<'_>> = page.posts.iter().map(PostView::from).collect();

        let mut context = tera::Context::new();
        context.insert("posts", &posts);
        context.insert("q", &q.unwrap_or_default());
        context.insert("tag", &tag.unwrap_or_default());
        context.insert("total", &page.total);
        context.insert("prev_page", &(page.page > 1).then(|| page.page - 1));
        context.insert("next_page", &page.has_next().then(|| page.page + 1));

        self.tera
            .render("index.html", &context)
            .map_err(template_error)
    }

    /// A single post. `preview` adds the draft banner and hides reader
    /// engagement.
    pub fn render_post(
        &self,
        post: &Post,
        comments: &[PublicComment],
        preview: bool,
    ) -> Result<String, AppError> {
        let mut context = tera::Context::new();
        context.insert("post", &PostView::from(post));
        context.insert("body", &render_html(&post.content));
        context.insert("comments", comments);
        context.insert("preview", &preview);

        self.tera
            .render("post.html", &context)
            .map_err(template_error)
    }
}

/// `GET /`
#[cfg(feature = "ssr")]
pub async fn index_page(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Query(params): axum::extract::Query<crate::api::public::PublicListParams>,
) -> Result<axum::response::Html<String>, AppError> {
    let q = params.q.clone();
    let page = crate::api::public::process_list_published(state.posts.as_ref(), params).await?;
    let html = state.pages.render_index(&page, q.as_deref(), None)?;
    Ok(axum::response::Html(html))
}

/// Query parameters of the tag page.
#[derive(Debug, Default, serde::Deserialize)]
pub struct TagPageParams {
    pub page: Option<u64>,
}

/// `GET /tag/{tag}`
///
/// A tag without published posts is not found.
#[cfg(feature = "ssr")]
pub async fn tag_page(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(tag): axum::extract::Path<String>,
    axum::extract::Query(params): axum::extract::Query<TagPageParams>,
) -> Result<axum::response::Html<String>, AppError> {
    let list = crate::api::public::PublicListParams {
        tag: Some(tag.clone()),
        page: params.page,
        ..Default::default()
    };
    let page = crate::api::public::process_list_published(state.posts.as_ref(), list).await?;
    if page.total == 0 {
        return Err(AppError::NotFound(format!("Tag '{}' not found", tag)));
    }
    let html = state.pages.render_index(&page, None, Some(&tag))?;
    Ok(axum::response::Html(html))
}

/// `GET /blog/{slug}`
#[cfg(feature = "ssr")]
pub async fn post_page(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(slug): axum::extract::Path<String>,
) -> Result<axum::response::Html<String>, AppError> {
    let post = crate::api::public::find_published(state.posts.as_ref(), &slug).await?;
    let comments: Vec<PublicComment> = state
        .engagement
        .list_approved_comments(&post.id)
        .await?
        .into_iter()
        .map(PublicComment::from)
        .collect();
    let html = state.pages.render_post(&post, &comments, false)?;
    Ok(axum::response::Html(html))
}

/// `GET /admin/preview/{id}`
#[cfg(feature = "ssr")]
pub async fn preview_page(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<axum::response::Html<String>, AppError> {
    let post = state
        .posts
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post '{}' not found", id)))?;
    let html = state.pages.render_post(&post, &[], true)?;
    Ok(axum::response::Html(html))
}
