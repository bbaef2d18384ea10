//! RSS feed, sitemap and the public tag list.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use url::Url;

use crate::config::AppConfig;
use crate::db::models::{Post, PostQuery, PostSort, PostStatus, TagCount};
use crate::db::repository::PostRepository;
use crate::error::AppError;

/// Posts included in the feed.
pub const FEED_LIMIT: u64 = 20;
/// Characters of summary per feed item.
const FEED_SUMMARY_CHARS: usize = 500;
const SITEMAP_PAGE_SIZE: u64 = 100;

const FEED_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";
const SITEMAP_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const FEED_CACHE_CONTROL: &str = "public, max-age=3600";

/// Site details used in absolute links.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub url: Url,
    pub title: String,
    pub description: String,
}

impl SiteInfo {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            url: config.site_url()?,
            title: config.site_title.clone(),
            description: config.site_description.clone(),
        })
    }

    /// Absolute URL of a site path, percent-encoding each segment.
    pub fn link(&self, segments: &[&str]) -> String {
        let mut url = self.url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }
}

/// Escape text for XML element content and attribute values.
pub fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn summary(post: &Post) -> String {
    let source = if post.description.is_empty() {
        &post.content_plain
    } else {
        &post.description
    };
    source.chars().take(FEED_SUMMARY_CHARS).collect()
}

/// RSS 2.0 document for the given posts, newest first.
pub fn render_feed(site: &SiteInfo, posts: &[Post]) -> String {
    let home = site.link(&[]);
    let mut xml = String::new();

    // Writing into a String never fails.
    let _ = write!(
        xml,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n\
         <channel>\n\
         <title>{}</title>\n\
         <link>{}</link>\n\
         <description>{}</description>\n\
         <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\"/>\n",
        xml_escape(&site.title),
        xml_escape(&home),
        xml_escape(&site.description),
        xml_escape(&site.link(&["feed.xml"])),
    );

    for post in posts {
        let link = xml_escape(&site.link(&["blog", &post.slug]));
        let date: DateTime<Utc> = post.published_at.unwrap_or(post.updated_at);
        let _ = write!(
            xml,
            "<item>\n\
             <title>{}</title>\n\
             <link>{link}</link>\n\
             <description>{}</description>\n\
             <pubDate>{}</pubDate>\n\
             <guid isPermaLink=\"true\">{link}</guid>\n\
             </item>\n",
            xml_escape(&post.title),
            xml_escape(&summary(post)),
            date.to_rfc2822(),
        );
    }

    xml.push_str("</channel>\n</rss>\n");
    xml
}

fn push_sitemap_url(
    xml: &mut String,
    loc: &str,
    lastmod: Option<DateTime<Utc>>,
    changefreq: &str,
    priority: &str,
) {
    let _ = write!(xml, "<url><loc>{}</loc>", xml_escape(loc));
    if let Some(lastmod) = lastmod {
        let _ = write!(xml, "<lastmod>{}</lastmod>", lastmod.format("%Y-%m-%d"));
    }
    let _ = writeln!(
        xml,
        "<changefreq>{changefreq}</changefreq><priority>{priority}</priority></url>"
    );
}

/// Sitemap of the home page, the post list, every published post and every
/// tag page.
pub fn render_sitemap(site: &SiteInfo, posts: &[Post], tags: &[TagCount]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );

    push_sitemap_url(&mut xml, &site.link(&[]), None, "daily", "1.0");
    push_sitemap_url(&mut xml, &site.link(&["blog"]), None, "daily", "0.9");
    for post in posts {
        push_sitemap_url(
            &mut xml,
            &site.link(&["blog", &post.slug]),
            Some(post.updated_at),
            "weekly",
            "0.8",
        );
    }
    for tag in tags {
        push_sitemap_url(&mut xml, &site.link(&["tag", &tag.name]), None, "weekly", "0.5");
    }

    xml.push_str("</urlset>\n");
    xml
}

fn published_query(page: u64, limit: u64) -> PostQuery {
    PostQuery {
        status: Some(PostStatus::Published),
        page,
        limit,
        sort: PostSort::PublishedDesc,
        ..Default::default()
    }
}

/// The feed for the latest published posts.
pub async fn process_feed(repo: &dyn PostRepository, site: &SiteInfo) -> Result<String, AppError> {
    let page = repo.list(&published_query(1, FEED_LIMIT)).await?;
    Ok(render_feed(site, &page.posts))
}

/// The sitemap over every published post and tag.
pub async fn process_sitemap(
    repo: &dyn PostRepository,
    site: &SiteInfo,
) -> Result<String, AppError> {
    let mut query = published_query(1, SITEMAP_PAGE_SIZE);
    let mut posts = Vec::new();
    loop {
        let page = repo.list(&query).await?;
        let has_next = page.has_next();
        posts.extend(page.posts);
        if !has_next {
            break;
        }
        query.page += 1;
    }

    let tags = repo.tag_counts().await?;
    Ok(render_sitemap(site, &posts, &tags))
}

#[cfg(feature = "ssr")]
fn xml_response(content_type: &'static str, body: String) -> axum::response::Response {
    use axum::response::IntoResponse;

    (
        [
            (axum::http::header::CONTENT_TYPE, content_type),
            (axum::http::header::CACHE_CONTROL, FEED_CACHE_CONTROL),
        ],
        body,
    )
        .into_response()
}

/// `GET /feed.xml`
#[cfg(feature = "ssr")]
pub async fn feed_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
) -> Result<axum::response::Response, AppError> {
    let site = SiteInfo::from_config(&state.config)?;
    let feed = process_feed(state.posts.as_ref(), &site).await?;
    Ok(xml_response(FEED_CONTENT_TYPE, feed))
}

/// `GET /sitemap.xml`
#[cfg(feature = "ssr")]
pub async fn sitemap_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
) -> Result<axum::response::Response, AppError> {
    let site = SiteInfo::from_config(&state.config)?;
    let sitemap = process_sitemap(state.posts.as_ref(), &site).await?;
    Ok(xml_response(SITEMAP_CONTENT_TYPE, sitemap))
}

/// `GET /api/tags`
#[cfg(feature = "ssr")]
pub async fn tags_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
) -> Result<axum::Json<Vec<TagCount>>, AppError> {
    let tags = state.posts.tag_counts().await?;
    Ok(axum::Json(tags))
}
