//! Batch jobs over the post collection.

use crate::db::models::PostQuery;
use crate::db::repository::PostRepository;
use crate::error::AppError;

const PAGE_SIZE: u64 = 100;

/// Attempts per post before a revision race is reported.
const MAX_ATTEMPTS: usize = 5;

/// Rewrite every post's plain text and reading time from its stored document.
///
/// Each write is conditional on the revision that was read, so an edit landing
/// in between is never overwritten; the post is reloaded and retried instead.
/// Posts deleted while the job runs are skipped. Returns the number of posts
/// rewritten.
pub async fn recompute_derived_fields(repo: &dyn PostRepository) -> Result<usize, AppError> {
    let mut query = PostQuery {
        page: 1,
        limit: PAGE_SIZE,
        ..Default::default()
    };

    // Collect first: rewriting bumps `updated_at`, which reorders the listing.
    let mut ids = Vec::new();
    loop {
        let page = repo.list(&query).await?;
        let has_next = page.has_next();
        ids.extend(page.posts.into_iter().map(|post| post.id));
        if !has_next {
            break;
        }
        query.page += 1;
    }

    let mut updated = 0;
    for id in &ids {
        if recompute_one(repo, id).await? {
            updated += 1;
        }
    }

    tracing::info!(updated, "Recomputed derived post fields");
    Ok(updated)
}

async fn recompute_one(repo: &dyn PostRepository, id: &str) -> Result<bool, AppError> {
    let mut attempt = 1;
    loop {
        let Some(post) = repo.find_by_id(id).await? else {
            tracing::debug!(post_id = %id, "Post vanished, skipped");
            return Ok(false);
        };

        match repo.save_document(id, post.content, Some(post.revision)).await {
            Ok(saved) => {
                tracing::debug!(post_id = %id, revision = saved.revision, "Recomputed");
                return Ok(true);
            }
            Err(AppError::NotFound(_)) => return Ok(false),
            Err(AppError::Conflict(msg)) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(post_id = %id, attempt, "Post changed while recomputing: {}", msg);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
