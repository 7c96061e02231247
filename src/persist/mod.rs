/// Browser-style key-value storage and typed preferences.
pub mod local;
/// SQLite implementation of [`WorkRepository`].
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    types::{FunctionType, WorkId},
    work::{Archive, KeyAssignment, KeyPoolEntry, PromptTemplate, Work, WorkDraft},
};

/// Storage failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// JSON encode/decode error.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// The blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(String),
    /// An update targeted a work that does not exist.
    #[error("work {0} not found")]
    MissingWork(WorkId),
    /// Any other failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for storage operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Remote tables the editor reads and writes.
///
/// Each call either returns its value or a [`PersistError`]; callers decide
/// how to surface failures. Nothing here retries.
#[async_trait]
pub trait WorkRepository: Send + Sync {
    /// Loads one work, `None` when no row has that id.
    async fn get_work_by_id(&self, id: WorkId) -> PersistResult<Option<Work>>;

    /// Writes `work` and returns the row as stored.
    async fn update_work(&self, work: &Work) -> PersistResult<Work>;

    /// Inserts a new work and returns it with its assigned id.
    async fn create_work(&self, draft: WorkDraft) -> PersistResult<Work>;

    /// Templates available to one assistant function.
    async fn templates_for(&self, function: FunctionType) -> PersistResult<Vec<PromptTemplate>>;

    /// Reference archives attached to a work.
    async fn archives_for_work(&self, work_id: WorkId) -> PersistResult<Vec<Archive>>;

    /// Every pooled API key.
    async fn key_pool(&self) -> PersistResult<Vec<KeyPoolEntry>>;

    /// The key assigned to `user_id`, if any.
    async fn key_assignment(&self, user_id: &str) -> PersistResult<Option<KeyAssignment>>;

    /// Records one use of the user's assigned key. Returns false when the
    /// user has no assignment.
    async fn increment_key_usage(&self, user_id: &str) -> PersistResult<bool>;
}
