//! In-memory chapter buffer owned by the editing session.

/// Chapter sequence plus last-persisted baseline.
pub mod buffer;
