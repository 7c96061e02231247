//! Per-function assistant selection memory.
//!
//! Every [`FunctionType`] owns an independent [`SelectionState`]; switching
//! function never touches another function's selections. States are values:
//! each update returns a new state.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::EditorConfig,
    persist::{PersistResult, local::LocalStore},
    types::{ArchiveId, ChapterIndex, FunctionType, SortOrder, TemplateId},
};

/// Local-storage key of a function's selection memory.
pub fn memory_key(function: FunctionType) -> String {
    format!("ai_assistant_{}_memory", function.as_str())
}

/// What the user picked for one assistant function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionState {
    selected_prompt: Option<TemplateId>,
    selected_model: String,
    selected_chapters: BTreeSet<ChapterIndex>,
    selected_archives: Vec<ArchiveId>,
    user_input: String,
    auto_associate: Option<usize>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(EditorConfig::default().default_model)
    }
}

impl SelectionState {
    /// Empty selection using `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            selected_prompt: None,
            selected_model: model.into(),
            selected_chapters: BTreeSet::new(),
            selected_archives: Vec::new(),
            user_input: String::new(),
            auto_associate: None,
        }
    }

    /// Selected template id.
    pub fn selected_prompt(&self) -> Option<TemplateId> {
        self.selected_prompt
    }

    /// Model passed to the backend.
    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Chapters included as context.
    pub fn selected_chapters(&self) -> &BTreeSet<ChapterIndex> {
        &self.selected_chapters
    }

    /// Selected archive ids in the order they were picked.
    pub fn selected_archives(&self) -> &[ArchiveId] {
        &self.selected_archives
    }

    /// Free-form instruction typed by the writer.
    pub fn user_input(&self) -> &str {
        &self.user_input
    }

    /// Chapter count kept associated automatically, when enabled.
    pub fn auto_associate(&self) -> Option<usize> {
        self.auto_associate
    }

    /// Copy with a different template.
    pub fn with_prompt(&self, prompt: Option<TemplateId>) -> Self {
        Self {
            selected_prompt: prompt,
            ..self.clone()
        }
    }

    /// Copy with a different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            selected_model: model.into(),
            ..self.clone()
        }
    }

    /// Copy with a different instruction.
    pub fn with_input(&self, input: impl Into<String>) -> Self {
        Self {
            user_input: input.into(),
            ..self.clone()
        }
    }

    /// Copy selecting exactly `chapters`.
    pub fn with_chapters(&self, chapters: impl IntoIterator<Item = ChapterIndex>) -> Self {
        Self {
            selected_chapters: chapters.into_iter().collect(),
            ..self.clone()
        }
    }

    /// Copy with `index` added, or removed if it was selected.
    pub fn toggle_chapter(&self, index: ChapterIndex) -> Self {
        let mut chapters = self.selected_chapters.clone();
        if !chapters.remove(&index) {
            chapters.insert(index);
        }
        Self {
            selected_chapters: chapters,
            ..self.clone()
        }
    }

    /// Adds an archive; already-selected ids are left where they are.
    pub fn add_archive(&self, id: ArchiveId) -> Self {
        if self.selected_archives.contains(&id) {
            return self.clone();
        }
        let mut archives = self.selected_archives.clone();
        archives.push(id);
        Self {
            selected_archives: archives,
            ..self.clone()
        }
    }

    /// Copy without archive `id`.
    pub fn remove_archive(&self, id: ArchiveId) -> Self {
        Self {
            selected_archives: self
                .selected_archives
                .iter()
                .copied()
                .filter(|a| *a != id)
                .collect(),
            ..self.clone()
        }
    }

    /// Copy with archive `id` added, or removed if it was selected.
    pub fn toggle_archive(&self, id: ArchiveId) -> Self {
        if self.selected_archives.contains(&id) {
            self.remove_archive(id)
        } else {
            self.add_archive(id)
        }
    }

    /// Selects the `count` most relevant chapters for `sort`: the last ones
    /// when descending, the first ones when ascending. If exactly that set is
    /// already selected the selection is cleared instead.
    pub fn associate_recent(&self, count: usize, chapter_count: usize, sort: SortOrder) -> Self {
        if chapter_count == 0 {
            return self.clone();
        }
        let target = recent_chapters(count, chapter_count, sort);
        let chapters = if target == self.selected_chapters {
            BTreeSet::new()
        } else {
            target
        };
        Self {
            selected_chapters: chapters,
            ..self.clone()
        }
    }

    /// Enables (with a count) or disables automatic association. Enabling
    /// applies the association immediately.
    pub fn with_auto_associate(
        &self,
        count: Option<usize>,
        chapter_count: usize,
        sort: SortOrder,
    ) -> Self {
        let next = Self {
            auto_associate: count,
            ..self.clone()
        };
        next.refresh_auto_association(chapter_count, sort)
    }

    /// Re-applies automatic association after the chapter list changed.
    pub fn refresh_auto_association(&self, chapter_count: usize, sort: SortOrder) -> Self {
        match self.auto_associate {
            Some(count) if count > 0 && chapter_count > 0 => Self {
                selected_chapters: recent_chapters(count, chapter_count, sort),
                ..self.clone()
            },
            _ => self.clone(),
        }
    }

    /// Drops chapter indices that no longer exist.
    pub fn retain_existing_chapters(&self, chapter_count: usize) -> Self {
        Self {
            selected_chapters: self
                .selected_chapters
                .iter()
                .copied()
                .filter(|i| *i < chapter_count)
                .collect(),
            ..self.clone()
        }
    }
}

fn recent_chapters(count: usize, chapter_count: usize, sort: SortOrder) -> BTreeSet<ChapterIndex> {
    match sort {
        SortOrder::Descending => (chapter_count.saturating_sub(count)..chapter_count).collect(),
        SortOrder::Ascending => (0..count.min(chapter_count)).collect(),
    }
}

/// One [`SelectionState`] per assistant function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionMemory {
    states: HashMap<FunctionType, SelectionState>,
    default_model: String,
}

impl SelectionMemory {
    /// Default state for every function.
    pub fn new(default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        let states = FunctionType::ALL
            .into_iter()
            .map(|f| (f, SelectionState::new(default_model.clone())))
            .collect();
        Self {
            states,
            default_model,
        }
    }

    /// Loads every function's memory, dropping stale chapter indices.
    pub fn load(
        store: &dyn LocalStore,
        chapter_count: usize,
        default_model: impl Into<String>,
    ) -> PersistResult<Self> {
        let mut memory = Self::new(default_model);
        for function in FunctionType::ALL {
            let state = memory.load_one(store, function, chapter_count)?;
            memory.states.insert(function, state);
        }
        Ok(memory)
    }

    /// State of `function`.
    pub fn get(&self, function: FunctionType) -> SelectionState {
        self.states
            .get(&function)
            .cloned()
            .unwrap_or_else(|| SelectionState::new(self.default_model.clone()))
    }

    /// Replaces `function`'s state with `update(current)` and returns it.
    pub fn update(
        &mut self,
        function: FunctionType,
        update: impl FnOnce(&SelectionState) -> SelectionState,
    ) -> SelectionState {
        let next = update(&self.get(function));
        self.states.insert(function, next.clone());
        next
    }

    /// Writes `function`'s state under its key.
    pub fn save(&self, store: &dyn LocalStore, function: FunctionType) -> PersistResult<()> {
        let raw = serde_json::to_string(&self.get(function))?;
        store.set(&memory_key(function), &raw)
    }

    fn load_one(
        &self,
        store: &dyn LocalStore,
        function: FunctionType,
        chapter_count: usize,
    ) -> PersistResult<SelectionState> {
        let Some(raw) = store.get(&memory_key(function))? else {
            return Ok(self.get(function));
        };
        match serde_json::from_str::<SelectionState>(&raw) {
            Ok(state) => Ok(state.retain_existing_chapters(chapter_count)),
            Err(err) => {
                tracing::warn!(%function, error = %err, "ignoring unreadable selection memory");
                Ok(self.get(function))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn associate_recent_picks_by_sort_and_toggles_off() {
        let state = SelectionState::default();

        let desc = state.associate_recent(2, 5, SortOrder::Descending);
        assert_eq!(desc.selected_chapters().iter().copied().collect::<Vec<_>>(), vec![3, 4]);

        let asc = state.associate_recent(2, 5, SortOrder::Ascending);
        assert_eq!(asc.selected_chapters().iter().copied().collect::<Vec<_>>(), vec![0, 1]);

        let cleared = asc.associate_recent(2, 5, SortOrder::Ascending);
        assert!(cleared.selected_chapters().is_empty());
    }

    #[test]
    fn auto_association_follows_chapter_count() {
        let state = SelectionState::default().with_auto_associate(Some(2), 3, SortOrder::Descending);
        assert_eq!(state.selected_chapters().iter().copied().collect::<Vec<_>>(), vec![1, 2]);

        let grown = state.refresh_auto_association(4, SortOrder::Descending);
        assert_eq!(grown.selected_chapters().iter().copied().collect::<Vec<_>>(), vec![2, 3]);

        let off = grown.with_auto_associate(None, 4, SortOrder::Descending);
        assert_eq!(off.refresh_auto_association(9, SortOrder::Descending), off);
    }

    #[test]
    fn toggling_a_chapter_twice_is_identity() {
        let state = SelectionState::default().with_chapters([1, 4]);
        assert_eq!(state.toggle_chapter(2).toggle_chapter(2), state);
    }

    #[test]
    fn memory_key_matches_stored_layout() {
        assert_eq!(memory_key(FunctionType::Polishing), "ai_assistant_ai_polishing_memory");
    }
}
