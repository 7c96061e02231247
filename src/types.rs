//! Shared primitive IDs and editor-wide enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Persisted work identifier.
pub type WorkId = i64;
/// Prompt template identifier.
pub type TemplateId = i64;
/// Reference archive identifier.
pub type ArchiveId = i64;
/// Zero-based chapter position. Position is the chapter's identity.
pub type ChapterIndex = usize;

/// AI assistant function type. Each one keeps its own selection memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    /// Continue or draft new text.
    Writing,
    /// Polish existing text.
    Polishing,
    /// Analyse the work.
    Analysis,
}

impl FunctionType {
    /// All function types, in display order.
    pub const ALL: [FunctionType; 3] = [Self::Writing, Self::Polishing, Self::Analysis];

    /// Stable storage tag, e.g. `ai_writing`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Writing => "ai_writing",
            Self::Polishing => "ai_polishing",
            Self::Analysis => "ai_analysis",
        }
    }

    /// Parses a storage tag produced by [`FunctionType::as_str`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == tag)
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chapter list ordering used by the sidebar and by prompt assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Lowest chapter index first.
    #[default]
    Ascending,
    /// Highest chapter index first.
    Descending,
}

impl SortOrder {
    /// Local-storage form (`asc` / `desc`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    /// Parses the local-storage form. Anything but `desc` is ascending.
    pub fn from_stored(value: &str) -> Self {
        if value == "desc" {
            Self::Descending
        } else {
            Self::Ascending
        }
    }

    /// Returns the opposite order.
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    /// Sorts chapter indices in place according to this order.
    pub fn sort_indices(self, indices: &mut [ChapterIndex]) {
        match self {
            Self::Ascending => indices.sort_unstable(),
            Self::Descending => indices.sort_unstable_by(|a, b| b.cmp(a)),
        }
    }
}
