//! Debounced autosave actor for an open work.

/// State and event types emitted by the actor.
pub mod events;
/// Handle and actor loop implementation.
pub mod handle;
