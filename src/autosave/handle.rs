use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::{JoinError, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    config::EditorConfig,
    core::buffer::{BufferError, ChapterBuffer},
    edit::Edit,
    persist::{PersistError, PersistResult, WorkRepository},
    types::{ChapterIndex, WorkId},
    work::{Chapter, Work},
};

use super::events::{AutosaveEvent, AutosaveState, AutosaveStatus, SaveOutcome};

/// Failure reported by the autosave actor or its handle.
#[derive(Debug, Error)]
pub enum AutosaveError {
    /// The edit did not apply to the buffer.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// Loading the work failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// No work with this id.
    #[error("work {0} not found")]
    NotFound(WorkId),
    /// A write reached the repository and failed.
    #[error("save failed: {0}")]
    SaveFailed(String),
    /// The actor has shut down.
    #[error("autosave task stopped")]
    ChannelClosed,
}

/// Cloneable handle to the autosave actor of one open work.
#[derive(Clone)]
pub struct AutosaveHandle {
    work_id: WorkId,
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<AutosaveEvent>,
}

enum Command {
    Edit {
        edit: Edit,
        resp: oneshot::Sender<Result<(), AutosaveError>>,
    },
    AddChapter {
        resp: oneshot::Sender<Result<ChapterIndex, AutosaveError>>,
    },
    SaveNow {
        resp: oneshot::Sender<Result<SaveOutcome, AutosaveError>>,
    },
    Chapters {
        resp: oneshot::Sender<Vec<Chapter>>,
    },
    Status {
        resp: oneshot::Sender<AutosaveStatus>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

enum Waiter {
    Save(oneshot::Sender<Result<SaveOutcome, AutosaveError>>),
    AddChapter {
        index: ChapterIndex,
        resp: oneshot::Sender<Result<ChapterIndex, AutosaveError>>,
    },
}

impl Waiter {
    fn resolve(self, result: &Result<SaveOutcome, String>) {
        match self {
            Waiter::Save(resp) => {
                let _ = resp.send(result.clone().map_err(AutosaveError::SaveFailed));
            }
            Waiter::AddChapter { index, resp } => {
                let _ = resp.send(match result {
                    Ok(_) => Ok(index),
                    Err(msg) => Err(AutosaveError::SaveFailed(msg.clone())),
                });
            }
        }
    }
}

type WriteOutput = (String, PersistResult<Work>);

struct InFlight {
    task: JoinHandle<WriteOutput>,
    waiters: Vec<Waiter>,
}

/// Loads a work and spawns its autosave actor.
pub async fn open_work(
    repo: Arc<dyn WorkRepository>,
    id: WorkId,
    config: &EditorConfig,
) -> Result<AutosaveHandle, AutosaveError> {
    let work = repo
        .get_work_by_id(id)
        .await?
        .ok_or(AutosaveError::NotFound(id))?;
    spawn_autosave(work, repo, config)
}

/// Spawns the actor that owns `work`'s chapter buffer.
///
/// The stored `work.content` is the initial "last persisted" baseline.
pub fn spawn_autosave(
    work: Work,
    repo: Arc<dyn WorkRepository>,
    config: &EditorConfig,
) -> Result<AutosaveHandle, AutosaveError> {
    let buffer = ChapterBuffer::from_work(&work)?;
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<AutosaveEvent>(config.event_capacity.max(1));

    let work_id = work.id;
    let mut saver = Autosaver {
        last_saved_at: Some(work.updated_at),
        work,
        buffer,
        repo,
        delay: config.autosave_delay(),
        deadline: None,
        in_flight: None,
        queued: Vec::new(),
        last_error: None,
        events_tx: events_tx.clone(),
    };

    tokio::spawn(async move {
        tracing::debug!(work_id, "autosave started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        saver.teardown().await;
                        break;
                    };
                    if let Some(done) = saver.handle_command(cmd) {
                        saver.teardown().await;
                        let _ = done.send(());
                        break;
                    }
                }
                _ = tokio::time::sleep_until(saver.deadline.unwrap_or_else(Instant::now)),
                    if saver.deadline.is_some() && saver.in_flight.is_none() => {
                    saver.deadline = None;
                    saver.start_write(Vec::new());
                }
                joined = join_in_flight(&mut saver.in_flight), if saver.in_flight.is_some() => {
                    saver.finish_write(joined);
                }
            }
        }
        tracing::debug!(work_id, "autosave stopped");
    });

    Ok(AutosaveHandle {
        work_id,
        cmd_tx,
        events_tx,
    })
}

impl AutosaveHandle {
    /// Id of the work this actor writes.
    pub fn work_id(&self) -> WorkId {
        self.work_id
    }

    /// Receives save lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.events_tx.subscribe()
    }

    /// Replaces a chapter body and re-arms the debounce timer.
    pub async fn edit_content(
        &self,
        index: ChapterIndex,
        content: impl Into<String>,
    ) -> Result<(), AutosaveError> {
        self.apply(Edit::SetContent {
            index,
            content: content.into(),
        })
        .await
    }

    /// Replaces a chapter title and re-arms the debounce timer.
    pub async fn edit_title(
        &self,
        index: ChapterIndex,
        title: impl Into<String>,
    ) -> Result<(), AutosaveError> {
        self.apply(Edit::SetTitle {
            index,
            title: title.into(),
        })
        .await
    }

    /// Applies any [`Edit`]. Content and title edits arm the debounce;
    /// [`Edit::AddChapter`] goes through [`add_chapter`](Self::add_chapter).
    pub async fn apply(&self, edit: Edit) -> Result<(), AutosaveError> {
        if edit.saves_immediately() {
            return self.add_chapter().await.map(|_| ());
        }
        let (tx, rx) = oneshot::channel();
        self.send(Command::Edit { edit, resp: tx }).await?;
        rx.await.map_err(|_| AutosaveError::ChannelClosed)?
    }

    /// Appends an empty chapter and writes immediately.
    ///
    /// Resolves with the new chapter's index once the write finished. On a
    /// failed write the chapter still exists in memory.
    pub async fn add_chapter(&self) -> Result<ChapterIndex, AutosaveError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::AddChapter { resp: tx }).await?;
        rx.await.map_err(|_| AutosaveError::ChannelClosed)?
    }

    /// Cancels any pending deadline and saves now if the content changed.
    pub async fn save_now(&self) -> Result<SaveOutcome, AutosaveError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SaveNow { resp: tx }).await?;
        rx.await.map_err(|_| AutosaveError::ChannelClosed)?
    }

    /// Snapshot of the current chapters, including unsaved edits.
    pub async fn chapters(&self) -> Result<Vec<Chapter>, AutosaveError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Chapters { resp: tx }).await?;
        rx.await.map_err(|_| AutosaveError::ChannelClosed)
    }

    /// Current save state and last error.
    pub async fn status(&self) -> Result<AutosaveStatus, AutosaveError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status { resp: tx }).await?;
        rx.await.map_err(|_| AutosaveError::ChannelClosed)
    }

    /// Ends the session. A pending debounce is dropped without writing;
    /// edits made inside that window are lost.
    pub async fn shutdown(&self) -> Result<(), AutosaveError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown { resp: tx }).await?;
        rx.await.map_err(|_| AutosaveError::ChannelClosed)
    }

    async fn send(&self, cmd: Command) -> Result<(), AutosaveError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| AutosaveError::ChannelClosed)
    }
}

struct Autosaver {
    work: Work,
    buffer: ChapterBuffer,
    repo: Arc<dyn WorkRepository>,
    delay: Duration,
    deadline: Option<Instant>,
    in_flight: Option<InFlight>,
    // explicit saves requested while a write was in flight
    queued: Vec<Waiter>,
    last_saved_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    events_tx: broadcast::Sender<AutosaveEvent>,
}

impl Autosaver {
    fn handle_command(&mut self, cmd: Command) -> Option<oneshot::Sender<()>> {
        match cmd {
            Command::Edit { edit, resp } => {
                let res = self.buffer.apply(edit).map_err(AutosaveError::from);
                if res.is_ok() {
                    self.arm();
                }
                let _ = resp.send(res);
            }
            Command::AddChapter { resp } => match self.buffer.apply(Edit::AddChapter) {
                Ok(()) => {
                    let index = self.buffer.len() - 1;
                    self.request_write(Some(Waiter::AddChapter { index, resp }));
                }
                Err(err) => {
                    let _ = resp.send(Err(err.into()));
                }
            },
            Command::SaveNow { resp } => {
                self.request_write(Some(Waiter::Save(resp)));
            }
            Command::Chapters { resp } => {
                let _ = resp.send(self.buffer.chapters().to_vec());
            }
            Command::Status { resp } => {
                let _ = resp.send(self.status());
            }
            Command::Shutdown { resp } => return Some(resp),
        }
        None
    }

    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
        let _ = self.events_tx.send(AutosaveEvent::Armed);
    }

    /// Cancels the debounce and writes now, or right after the write in
    /// flight completes.
    fn request_write(&mut self, waiter: Option<Waiter>) {
        self.deadline = None;
        self.queued.extend(waiter);
        if self.in_flight.is_none() {
            let waiters = std::mem::take(&mut self.queued);
            self.start_write(waiters);
        }
    }

    fn start_write(&mut self, waiters: Vec<Waiter>) {
        let Some(serialized) = self.buffer.dirty_serialization() else {
            self.last_error = None;
            let _ = self.events_tx.send(AutosaveEvent::Unchanged);
            let outcome = Ok(SaveOutcome::Unchanged);
            for waiter in waiters {
                waiter.resolve(&outcome);
            }
            return;
        };

        let mut work = self.work.clone();
        work.content = serialized.clone();
        work.updated_at = Utc::now();
        tracing::debug!(work_id = work.id, bytes = serialized.len(), "autosave write started");

        let repo = Arc::clone(&self.repo);
        let task = tokio::spawn(async move {
            let res = repo.update_work(&work).await;
            (serialized, res)
        });
        self.in_flight = Some(InFlight { task, waiters });
    }

    fn finish_write(&mut self, joined: Result<WriteOutput, JoinError>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let outcome = match joined {
            Ok((serialized, Ok(stored))) => {
                let at = stored.updated_at;
                let bytes = serialized.len();
                self.work = Work {
                    content: serialized.clone(),
                    ..stored
                };
                self.buffer.mark_persisted(serialized);
                self.last_saved_at = Some(at);
                self.last_error = None;
                tracing::info!(work_id = self.work.id, bytes, "work saved");
                let _ = self.events_tx.send(AutosaveEvent::Saved { at, bytes });
                Ok(SaveOutcome::Written { at })
            }
            Ok((_, Err(err))) => Err(self.record_failure(err.to_string())),
            Err(join_err) => Err(self.record_failure(format!("save task failed: {join_err}"))),
        };

        for waiter in in_flight.waiters {
            waiter.resolve(&outcome);
        }

        if !self.queued.is_empty() {
            let waiters = std::mem::take(&mut self.queued);
            self.start_write(waiters);
        }
    }

    fn record_failure(&mut self, message: String) -> String {
        tracing::warn!(work_id = self.work.id, error = %message, "work save failed");
        self.last_error = Some(message.clone());
        let _ = self.events_tx.send(AutosaveEvent::SaveFailed {
            message: message.clone(),
        });
        message
    }

    /// Drops the debounce without writing, lets the write in flight land,
    /// then serves explicit saves that were queued behind it.
    async fn teardown(&mut self) {
        if self.deadline.take().is_some() {
            tracing::debug!(work_id = self.work.id, "pending autosave dropped on teardown");
        }
        while self.in_flight.is_some() {
            let joined = join_in_flight(&mut self.in_flight).await;
            self.finish_write(joined);
        }
    }

    fn status(&self) -> AutosaveStatus {
        let state = if self.in_flight.is_some() {
            AutosaveState::Writing
        } else if self.deadline.is_some() {
            AutosaveState::PendingWrite
        } else if self.last_error.is_some() {
            AutosaveState::Error
        } else {
            AutosaveState::Idle
        };
        AutosaveStatus {
            state,
            last_saved_at: self.last_saved_at,
            last_error: self.last_error.clone(),
        }
    }
}

async fn join_in_flight(slot: &mut Option<InFlight>) -> Result<WriteOutput, JoinError> {
    match slot.as_mut() {
        Some(in_flight) => (&mut in_flight.task).await,
        None => std::future::pending().await,
    }
}
