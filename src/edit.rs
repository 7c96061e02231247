//! Edit operations applied to the in-memory chapter buffer.

use serde::{Deserialize, Serialize};

use crate::types::ChapterIndex;

/// One user mutation of the chapter sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edit {
    /// Replace a chapter body.
    SetContent {
        /// Target chapter.
        index: ChapterIndex,
        /// New body.
        content: String,
    },
    /// Replace a chapter title.
    SetTitle {
        /// Target chapter.
        index: ChapterIndex,
        /// New title.
        title: String,
    },
    /// Append an empty chapter at the end.
    AddChapter,
}

impl Edit {
    /// True for edits that bypass the debounce and save immediately.
    pub fn saves_immediately(&self) -> bool {
        matches!(self, Self::AddChapter)
    }
}
