use thiserror::Error;

use crate::{
    codec::{self, CodecError},
    edit::Edit,
    types::ChapterIndex,
    work::{Chapter, Work},
};

/// Edit or load failure of a [`ChapterBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The edit named a chapter past the end.
    #[error("chapter {index} does not exist (buffer has {len})")]
    MissingChapter {
        /// Requested chapter.
        index: ChapterIndex,
        /// Chapters in the buffer.
        len: usize,
    },
    /// Stored content did not decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Authoritative chapter sequence of one open work, plus the serialization
/// that was last persisted.
#[derive(Debug, Clone)]
pub struct ChapterBuffer {
    chapters: Vec<Chapter>,
    baseline: String,
}

impl ChapterBuffer {
    /// Opens a buffer from a loaded work. The stored content is the baseline.
    pub fn from_work(work: &Work) -> Result<Self, BufferError> {
        let chapters = codec::parse(&work.content)?;
        Ok(Self {
            chapters,
            baseline: work.content.clone(),
        })
    }

    /// Buffer with no persisted baseline. An empty list becomes one
    /// empty chapter.
    pub fn from_chapters(chapters: Vec<Chapter>) -> Self {
        let mut chapters = chapters;
        if chapters.is_empty() {
            chapters.push(Chapter::default());
        }
        Self {
            chapters,
            baseline: String::new(),
        }
    }

    /// Applies `edit`. Indexes past the end are rejected unchanged.
    pub fn apply(&mut self, edit: Edit) -> Result<(), BufferError> {
        match edit {
            Edit::SetContent { index, content } => {
                self.chapter_mut(index)?.content = content;
            }
            Edit::SetTitle { index, title } => {
                self.chapter_mut(index)?.title = title;
            }
            Edit::AddChapter => {
                self.chapters.push(Chapter::default());
            }
        }
        Ok(())
    }

    /// Chapters in display order.
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Number of chapters.
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// True when there are no chapters.
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Encodes the current chapters.
    pub fn serialized(&self) -> String {
        codec::serialize(&self.chapters)
    }

    /// Returns the current serialization when it differs from the baseline.
    pub fn dirty_serialization(&self) -> Option<String> {
        let current = self.serialized();
        (current != self.baseline).then_some(current)
    }

    /// True when the chapters differ from the baseline.
    pub fn is_dirty(&self) -> bool {
        self.dirty_serialization().is_some()
    }

    /// Serialization last known to be stored.
    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// Records `serialized` as stored.
    pub fn mark_persisted(&mut self, serialized: String) {
        self.baseline = serialized;
    }

    fn chapter_mut(&mut self, index: ChapterIndex) -> Result<&mut Chapter, BufferError> {
        let len = self.chapters.len();
        self.chapters
            .get_mut(index)
            .ok_or(BufferError::MissingChapter { index, len })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn work(content: &str) -> Work {
        Work {
            id: 1,
            title: "Draft".to_string(),
            kind: "novel".to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn loaded_content_is_clean_until_edited() {
        let stored = codec::serialize(&[Chapter::new("One", "Once upon a time")]);
        let mut buf = ChapterBuffer::from_work(&work(&stored)).expect("open");
        assert!(!buf.is_dirty());

        buf.apply(Edit::SetContent {
            index: 0,
            content: "Once upon a midnight".to_string(),
        })
        .expect("edit");
        let dirty = buf.dirty_serialization().expect("dirty");

        buf.mark_persisted(dirty);
        assert!(!buf.is_dirty());
    }

    #[test]
    fn empty_work_opens_with_one_chapter() {
        let buf = ChapterBuffer::from_work(&work("")).expect("open");
        assert_eq!(buf.chapters(), &[Chapter::default()]);
    }

    #[test]
    fn editing_missing_chapter_fails() {
        let mut buf = ChapterBuffer::from_chapters(vec![]);
        let err = buf
            .apply(Edit::SetTitle {
                index: 3,
                title: "x".to_string(),
            })
            .expect_err("missing");
        assert_eq!(err, BufferError::MissingChapter { index: 3, len: 1 });
    }
}
