//! Debounced, single-flight autosave for one post being edited.
//!
//! Edits are pushed with [`AutosaveCoordinator::notify`]. A background task
//! owns the debounce timer and the fingerprint of the last acknowledged draft.
//! It performs every write itself, one at a time, so two saves for the same
//! post can never overlap. Publish, unpublish and delete skip the timer and go
//! through the same task, which orders them after any save already in flight.
//!
//! Dropping the coordinator cancels a pending debounce without flushing it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::db::models::{CreatePostRequest, Post, PostStatus, UpdatePostRequest};
use crate::error::AppError;
use crate::models::document::Document;

/// Default debounce delay between the last edit and the save.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

/// How long `Saved` is shown before falling back to `Idle`.
pub const DEFAULT_SAVED_DISPLAY: Duration = Duration::from_millis(2000);

/// Post lifecycle calls the coordinator needs.
#[async_trait]
pub trait PostApi: Send + Sync {
    async fn create(&self, draft: CreatePostRequest) -> Result<Post, AppError>;

    async fn update(&self, id: &str, changes: UpdatePostRequest) -> Result<Post, AppError>;

    async fn set_status(&self, id: &str, status: PostStatus) -> Result<Post, AppError>;

    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

/// The editable fields of a post, as held by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostDraft {
    pub title: String,
    pub description: String,
    pub content: Document,
    pub tags: Vec<String>,
    pub category: String,
    pub cover_image: String,
    pub og_image: String,
}

impl PostDraft {
    /// Serialized snapshot used to detect no-op saves.
    pub fn fingerprint(&self) -> String {
        // An empty fingerprint never matches a saved one, so a failure here
        // only costs a redundant write.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Whole-draft update: every field is sent, content replaces the stored
    /// tree.
    pub fn to_update(&self) -> UpdatePostRequest {
        UpdatePostRequest {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            content: Some(self.content.clone()),
            tags: Some(self.tags.clone()),
            category: Some(self.category.clone()),
            cover_image: Some(self.cover_image.clone()),
            og_image: Some(self.og_image.clone()),
            ..Default::default()
        }
    }
}

impl From<&Post> for PostDraft {
    fn from(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            description: post.description.clone(),
            content: post.content.clone(),
            tags: post.tags.clone(),
            category: post.category.clone(),
            cover_image: post.cover_image.clone(),
            og_image: post.og_image.clone(),
        }
    }
}

/// What the editor shows next to the save indicator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    /// The last save failed; the draft is still dirty.
    Error(String),
}

#[derive(Debug, Error)]
pub enum AutosaveError {
    /// The coordinator was shut down, either dropped or after a delete.
    #[error("autosave coordinator is closed")]
    Closed,

    #[error(transparent)]
    Api(#[from] AppError),
}

/// Timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct AutosaveConfig {
    pub delay: Duration,
    pub saved_display: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            saved_display: DEFAULT_SAVED_DISPLAY,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, AutosaveError>>;

enum Command {
    Edit(PostDraft),
    Flush(Reply<()>),
    SetStatus(PostStatus, Reply<Post>),
    Delete(Reply<()>),
}

/// Handle to the autosave task of one post.
pub struct AutosaveCoordinator {
    post_id: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SaveStatus>,
}

impl AutosaveCoordinator {
    /// Start autosaving post `post_id`, whose stored state is `saved`.
    pub fn spawn(
        api: Arc<dyn PostApi>,
        post_id: impl Into<String>,
        saved: &PostDraft,
        config: AutosaveConfig,
    ) -> Self {
        let post_id = post_id.into();
        let (commands, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SaveStatus::Idle);

        let worker = Worker {
            api,
            post_id: post_id.clone(),
            config,
            pending: None,
            deadline: None,
            idle_at: None,
            last_saved: saved.fingerprint(),
            status: status_tx,
        };
        tokio::spawn(worker.run(rx));

        Self {
            post_id,
            commands,
            status,
        }
    }

    /// Create a new draft post and start autosaving it.
    pub async fn create(
        api: Arc<dyn PostApi>,
        draft: CreatePostRequest,
        config: AutosaveConfig,
    ) -> Result<(Self, Post), AutosaveError> {
        let post = api.create(draft).await?;
        let coordinator = Self::spawn(api, post.id.clone(), &PostDraft::from(&post), config);
        Ok((coordinator, post))
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    /// Record a local edit and restart the debounce timer.
    pub fn notify(&self, draft: PostDraft) -> Result<(), AutosaveError> {
        self.commands
            .send(Command::Edit(draft))
            .map_err(|_| AutosaveError::Closed)
    }

    /// Save the pending draft now, skipping the rest of the debounce delay.
    pub async fn flush_now(&self) -> Result<(), AutosaveError> {
        self.request(Command::Flush).await
    }

    /// Flush pending edits, then publish.
    pub async fn publish(&self) -> Result<Post, AutosaveError> {
        self.request(|reply| Command::SetStatus(PostStatus::Published, reply))
            .await
    }

    /// Flush pending edits, then revert to draft.
    pub async fn unpublish(&self) -> Result<Post, AutosaveError> {
        self.request(|reply| Command::SetStatus(PostStatus::Draft, reply))
            .await
    }

    /// Delete the post.
    ///
    /// Pending edits are discarded and a save already in flight completes
    /// first. On success the coordinator closes: later calls fail with
    /// [`AutosaveError::Closed`] and nothing is written after the delete.
    pub async fn delete(&self) -> Result<(), AutosaveError> {
        self.request(Command::Delete).await
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, AutosaveError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| AutosaveError::Closed)?;
        response.await.map_err(|_| AutosaveError::Closed)?
    }
}

struct Worker {
    api: Arc<dyn PostApi>,
    post_id: String,
    config: AutosaveConfig,
    /// Latest edit not yet acknowledged by the store.
    pending: Option<PostDraft>,
    deadline: Option<Instant>,
    idle_at: Option<Instant>,
    last_saved: String,
    status: watch::Sender<SaveStatus>,
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Edit(draft)) => self.on_edit(draft),
                    Some(Command::Flush(reply)) => {
                        self.deadline = None;
                        let _ = reply.send(self.save_pending().await);
                    }
                    Some(Command::SetStatus(status, reply)) => {
                        self.deadline = None;
                        let _ = reply.send(self.set_status(status).await);
                    }
                    Some(Command::Delete(reply)) => {
                        self.deadline = None;
                        match self.api.delete(&self.post_id).await {
                            Ok(()) => {
                                self.pending = None;
                                rx.close();
                                tracing::info!(post_id = %self.post_id, "Post deleted, autosave closed");
                                let _ = reply.send(Ok(()));
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(post_id = %self.post_id, error = %e, "Delete failed");
                                if self.pending.is_some() {
                                    self.deadline = Some(Instant::now() + self.config.delay);
                                }
                                self.status.send_replace(SaveStatus::Error(e.to_string()));
                                let _ = reply.send(Err(e.into()));
                            }
                        }
                    }
                    None => {
                        if self.deadline.is_some() {
                            tracing::debug!(post_id = %self.post_id, "Editor closed, pending autosave cancelled");
                        }
                        break;
                    }
                },
                _ = wait_until(self.deadline) => {
                    self.deadline = None;
                    // Failures are reported through the status channel.
                    let _ = self.save_pending().await;
                }
                _ = wait_until(self.idle_at) => {
                    self.idle_at = None;
                    if *self.status.borrow() == SaveStatus::Saved {
                        self.status.send_replace(SaveStatus::Idle);
                    }
                }
            }
        }
    }

    fn on_edit(&mut self, draft: PostDraft) {
        self.pending = Some(draft);
        self.deadline = Some(Instant::now() + self.config.delay);
        if matches!(*self.status.borrow(), SaveStatus::Error(_)) {
            self.status.send_replace(SaveStatus::Idle);
        }
    }

    async fn save_pending(&mut self) -> Result<(), AutosaveError> {
        let Some(draft) = self.pending.take() else {
            return Ok(());
        };

        let fingerprint = draft.fingerprint();
        if fingerprint == self.last_saved {
            tracing::debug!(post_id = %self.post_id, "Draft unchanged, skipping save");
            return Ok(());
        }

        self.idle_at = None;
        self.status.send_replace(SaveStatus::Saving);

        match self.api.update(&self.post_id, draft.to_update()).await {
            Ok(post) => {
                self.last_saved = fingerprint;
                self.status.send_replace(SaveStatus::Saved);
                self.idle_at = Some(Instant::now() + self.config.saved_display);
                tracing::debug!(post_id = %self.post_id, revision = post.revision, "Autosaved");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(post_id = %self.post_id, "Autosave failed: {e}");
                self.pending = Some(draft);
                self.status.send_replace(SaveStatus::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    async fn set_status(&mut self, status: PostStatus) -> Result<Post, AutosaveError> {
        self.save_pending().await?;
        let post = self.api.set_status(&self.post_id, status).await?;
        tracing::info!(post_id = %self.post_id, status = status.as_str(), "Post status changed");
        Ok(post)
    }
}
