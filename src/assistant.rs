//! AI assistant session: selection memory, prompt assembly, generation and
//! the render queue for one open work.

use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    autosave::handle::{AutosaveError, AutosaveHandle},
    config::EditorConfig,
    generation::{GenerationBackend, GenerationError, GenerationOptions},
    persist::{PersistError, local::LocalStore},
    prompt::{self, PromptError, PromptInput, TemplateResolver},
    render::{RenderHandle, spawn_render_queue},
    selection::{SelectionMemory, SelectionState},
    types::{ChapterIndex, FunctionType, SortOrder},
    work::{Archive, Chapter, PromptTemplate},
};

/// Failure of an assistant operation.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The prompt could not be assembled.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The backend or template resolution failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Selection memory could not be stored.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// Writing generated text into the work failed.
    #[error(transparent)]
    Autosave(#[from] AutosaveError),
    /// A stream is still open.
    #[error("a generation is already running")]
    AlreadyGenerating,
    /// Nothing was generated in this session yet.
    #[error("nothing has been generated")]
    NoOutput,
}

/// How generated text is written back into a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Overwrite the chapter body.
    Replace,
    /// Append to the chapter body.
    Append,
}

struct Generation {
    task: JoinHandle<Result<(), GenerationError>>,
    // full text received from the backend, ahead of the reveal
    output_rx: watch::Receiver<String>,
    render: RenderHandle,
}

/// Assistant state for one open work.
///
/// Selection changes are written to local storage as they happen, so every
/// function's state survives switching, closing and dropping the session.
pub struct AssistantSession {
    active: FunctionType,
    memory: SelectionMemory,
    sort: SortOrder,
    store: Arc<dyn LocalStore>,
    backend: Arc<dyn GenerationBackend>,
    resolver: Option<Arc<dyn TemplateResolver>>,
    config: EditorConfig,
    generation: Option<Generation>,
    last_output: Option<String>,
}

impl AssistantSession {
    /// Opens a session, restoring every function's selection memory.
    pub fn open(
        store: Arc<dyn LocalStore>,
        backend: Arc<dyn GenerationBackend>,
        config: EditorConfig,
        function: FunctionType,
        chapter_count: usize,
    ) -> Result<Self, AssistantError> {
        let memory = SelectionMemory::load(store.as_ref(), chapter_count, config.default_model.clone())?;
        Ok(Self {
            active: function,
            memory,
            sort: SortOrder::default(),
            store,
            backend,
            resolver: None,
            config,
            generation: None,
            last_output: None,
        })
    }

    /// Resolves encrypted templates through `resolver` before sending.
    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Function type the assistant is working in.
    pub fn active_function(&self) -> FunctionType {
        self.active
    }

    /// Switches function type. Other functions' selections are untouched.
    /// Polishing starts from the text being edited when there is any.
    ///
    /// The outgoing function's state is stored before switching.
    pub fn switch_function(
        &mut self,
        function: FunctionType,
        current_text: &str,
    ) -> Result<(), AssistantError> {
        self.memory.save(self.store.as_ref(), self.active)?;
        self.active = function;
        if function == FunctionType::Polishing && !current_text.trim().is_empty() {
            self.update_selection(|s| s.with_input(current_text))?;
        }
        Ok(())
    }

    /// Chapter order used for prompt excerpts and auto-association.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    /// Current selection of the active function.
    pub fn selection(&self) -> SelectionState {
        self.memory.get(self.active)
    }

    /// Replaces the active function's selection with `update(current)`,
    /// stores it, and returns it.
    pub fn update_selection(
        &mut self,
        update: impl FnOnce(&SelectionState) -> SelectionState,
    ) -> Result<SelectionState, AssistantError> {
        let next = self.memory.update(self.active, update);
        self.memory.save(self.store.as_ref(), self.active)?;
        Ok(next)
    }

    /// True while the backend stream is still open.
    pub fn is_generating(&self) -> bool {
        self.generation
            .as_ref()
            .is_some_and(|g| !g.task.is_finished())
    }

    /// Render queue of the current generation, for views to subscribe to.
    pub fn render(&self) -> Option<&RenderHandle> {
        self.generation.as_ref().map(|g| &g.render)
    }

    /// Assembles the prompt for the active function and starts streaming.
    ///
    /// Fails without contacting the backend when no template is selected
    /// or a generation is already running.
    pub fn generate(
        &mut self,
        templates: &[PromptTemplate],
        chapters: &[Chapter],
        archives: &[Archive],
    ) -> Result<(), AssistantError> {
        if self.is_generating() {
            return Err(AssistantError::AlreadyGenerating);
        }

        let state = self.selection();
        let template = state
            .selected_prompt()
            .and_then(|id| templates.iter().find(|t| t.id == id));
        let selected_archives: Vec<&Archive> = state
            .selected_archives()
            .iter()
            .filter_map(|id| archives.iter().find(|a| a.id == *id))
            .collect();

        let assembled = prompt::assemble(&PromptInput {
            template,
            instruction: state.user_input(),
            chapters,
            selected_chapters: state.selected_chapters(),
            archives: &selected_archives,
            sort: self.sort,
            excerpt_limit: self.config.excerpt_limit,
        })?;

        let messages = match &self.resolver {
            Some(resolver) => prompt::resolve_encrypted_refs(&assembled, resolver.as_ref())
                .map_err(GenerationError::from)?,
            None => assembled.messages,
        };

        let (fragment_tx, render) =
            spawn_render_queue(self.config.frame_interval(), self.config.event_capacity);
        let (output_tx, output_rx) = watch::channel(String::new());
        let backend = Arc::clone(&self.backend);
        let options = GenerationOptions {
            model: state.selected_model().to_string(),
        };
        let function = self.active;
        tracing::info!(%function, model = %options.model, "generation started");
        let task = tokio::spawn(async move {
            let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
            let forward = async move {
                while let Some(chunk) = chunk_rx.recv().await {
                    output_tx.send_modify(|text| text.push_str(&chunk));
                    let _ = fragment_tx.send(chunk);
                }
            };
            let (res, ()) = tokio::join!(
                backend.generate_content_stream(messages, options, chunk_tx),
                forward
            );
            match &res {
                Ok(()) => tracing::info!(%function, "generation finished"),
                Err(err) => tracing::warn!(%function, error = %err, "generation failed"),
            }
            res
        });

        self.last_output = None;
        self.generation = Some(Generation {
            task,
            output_rx,
            render,
        });
        Ok(())
    }

    /// Waits for the stream to end and every unit to be revealed, and
    /// returns the generated text.
    pub async fn finish(&mut self) -> Result<String, AssistantError> {
        let Some(mut generation) = self.generation.take() else {
            return self.last_output.clone().ok_or(AssistantError::NoOutput);
        };

        let outcome = match (&mut generation.task).await {
            Ok(res) => res,
            Err(join_err) => Err(GenerationError::Stream(join_err.to_string())),
        };
        generation.render.join().await;
        let text = generation.output_rx.borrow().clone();
        self.last_output = Some(text.clone());
        outcome?;
        Ok(text)
    }

    /// Writes the last generated text into chapter `index`.
    pub async fn apply_output(
        &self,
        editor: &AutosaveHandle,
        index: ChapterIndex,
        mode: ApplyMode,
    ) -> Result<(), AssistantError> {
        let output = self.last_output.as_deref().ok_or(AssistantError::NoOutput)?;
        let content = match mode {
            ApplyMode::Replace => output.to_string(),
            ApplyMode::Append => {
                let chapters = editor.chapters().await?;
                let existing = chapters
                    .get(index)
                    .map(|c| c.content.as_str())
                    .unwrap_or_default();
                format!("{existing}{output}")
            }
        };
        editor.edit_content(index, content).await?;
        Ok(())
    }

    /// Closes the assistant. Refused while generating; otherwise persists
    /// the active function's selection memory. Text from a stream that ended
    /// without [`finish`](Self::finish) stays available to
    /// [`apply_output`](Self::apply_output).
    pub fn close(&mut self) -> Result<bool, AssistantError> {
        if self.is_generating() {
            return Ok(false);
        }
        self.memory.save(self.store.as_ref(), self.active)?;
        if let Some(generation) = self.generation.take() {
            self.last_output = Some(generation.output_rx.borrow().clone());
        }
        Ok(true)
    }
}

impl Drop for AssistantSession {
    fn drop(&mut self) {
        if let Some(generation) = &self.generation {
            generation.task.abort();
        }
    }
}
