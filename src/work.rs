//! Work, chapter, template, archive and key-pool records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ArchiveId, FunctionType, TemplateId, WorkId};

/// Leading marker of an encrypted template body (base64 of `Salted__`).
pub const ENCRYPTED_MARKER: &str = "U2F";

/// One chapter of a work. Its position in the sequence is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title, may be blank.
    pub title: String,
    /// Chapter body text.
    pub content: String,
}

impl Chapter {
    /// Builds a chapter from a title and body.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Persisted long-form work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    /// Stable work identifier.
    pub id: WorkId,
    /// Work title.
    pub title: String,
    /// Free-form work type (novel, short story, ...).
    pub kind: String,
    /// Serialized chapter sequence, see [`crate::codec`].
    pub content: String,
    /// Last successful persistence time.
    pub updated_at: DateTime<Utc>,
}

/// Insert payload used to create a new [`Work`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDraft {
    /// Work title.
    pub title: String,
    /// Free-form work type.
    pub kind: String,
    /// Initial serialized content.
    pub content: String,
}

/// Template body, classified once when the row is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateContent {
    /// Plaintext template embedded verbatim in prompts.
    Plain(String),
    /// Encrypted template; only its id travels through prompt assembly.
    EncryptedRef(TemplateId),
}

impl TemplateContent {
    /// Classifies a stored template body by its leading marker.
    pub fn classify(id: TemplateId, raw: &str) -> Self {
        if raw.starts_with(ENCRYPTED_MARKER) {
            Self::EncryptedRef(id)
        } else {
            Self::Plain(raw.to_string())
        }
    }

    /// True when the body must be resolved at the generation boundary.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::EncryptedRef(_))
    }
}

/// Read-only prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Stable template identifier.
    pub id: TemplateId,
    /// Display title.
    pub title: String,
    /// Template body.
    pub content: TemplateContent,
    /// Assistant function this template belongs to.
    pub function: FunctionType,
}

/// Archive category. `Character` entries get their own prompt block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveCategory {
    /// Character sheet.
    Character,
    /// Work introduction / blurb.
    Introduction,
    /// Any other user-defined category.
    Other(String),
}

impl ArchiveCategory {
    /// Parses the stored category column.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "character" => Self::Character,
            "introduction" => Self::Introduction,
            other => Self::Other(other.to_string()),
        }
    }

    /// Stored category column value.
    pub fn as_stored(&self) -> &str {
        match self {
            Self::Character => "character",
            Self::Introduction => "introduction",
            Self::Other(v) => v,
        }
    }
}

/// Reusable reference snippet attached to a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    /// Stable archive identifier.
    pub id: ArchiveId,
    /// Owning work.
    pub work_id: WorkId,
    /// Display title.
    pub title: String,
    /// Snippet text.
    pub content: String,
    /// Category.
    pub category: ArchiveCategory,
}

/// One API key in the shared pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPoolEntry {
    /// Pool row id.
    pub id: i64,
    /// The key itself.
    pub api_key: String,
    /// Total uses across all assignments.
    pub usage_count: u64,
    /// Inactive keys are never handed out.
    pub is_active: bool,
}

/// A user's current key assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAssignment {
    /// Assignment row id.
    pub id: i64,
    /// Auth user id.
    pub user_id: String,
    /// Assigned pool key.
    pub key_id: i64,
    /// Uses under this assignment.
    pub usage_count: u64,
    /// Last time the key was used.
    pub last_used: Option<DateTime<Utc>>,
    /// When the key was assigned.
    pub assigned_at: DateTime<Utc>,
}
