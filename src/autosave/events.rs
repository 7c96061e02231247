//! Autosave state and event payloads.

use chrono::{DateTime, Utc};

/// Scheduler state as observed from outside the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveState {
    /// Nothing pending.
    Idle,
    /// A debounce deadline is armed.
    PendingWrite,
    /// One persistence write is in flight.
    Writing,
    /// The last write failed; the next edit re-arms the timer.
    Error,
}

/// Snapshot returned by [`super::handle::AutosaveHandle::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveStatus {
    /// Current state.
    pub state: AutosaveState,
    /// Time of the last successful write, or the loaded `updated_at`.
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Message of the last failed write, cleared by the next good cycle.
    pub last_error: Option<String>,
}

/// Result of one save cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The content was written.
    Written {
        /// Timestamp recorded on the work.
        at: DateTime<Utc>,
    },
    /// Content matched the last persisted serialization; no write issued.
    Unchanged,
}

/// Events emitted by the autosave actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    /// An edit (re)armed the debounce timer.
    Armed,
    /// A write succeeded.
    Saved {
        /// Timestamp recorded on the work.
        at: DateTime<Utc>,
        /// Size of the persisted serialization in bytes.
        bytes: usize,
    },
    /// A save cycle found nothing to write.
    Unchanged,
    /// A write failed. Not retried.
    SaveFailed {
        /// User-facing failure message.
        message: String,
    },
}
