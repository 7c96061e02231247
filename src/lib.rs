//! Editing core for long-form writing: chapter encoding, debounced
//! autosave, AI prompt assembly and paced rendering of streamed output.
//!
//! # Examples
//!
//! Chapter encoding with [`codec`]:
//! ```
//! use quillpad::{codec, work::Chapter};
//!
//! let chapters = vec![
//!     Chapter::new("Opening", "It was late."),
//!     Chapter::new("Second", "Morning came."),
//! ];
//! let blob = codec::serialize(&chapters);
//! assert_eq!(codec::parse(&blob).expect("parse"), chapters);
//!
//! // Content written before chapters existed is one untitled chapter.
//! let legacy = codec::parse("plain text").expect("parse");
//! assert_eq!(legacy.len(), 1);
//! ```
//!
//! Autosave over a SQLite repository:
//! ```no_run
//! use std::sync::Arc;
//! use quillpad::{
//!     autosave::handle::open_work,
//!     config::EditorConfig,
//!     persist::sqlite::SqliteRepository,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let repo = SqliteRepository::open("quillpad.db").expect("open sqlite");
//! let editor = open_work(Arc::new(repo), 1, &EditorConfig::default())
//!     .await
//!     .expect("open work");
//! editor.edit_content(0, "The first line.").await.expect("edit");
//! editor.save_now().await.expect("save");
//! editor.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Assistant session tying selection, prompts, generation and rendering.
pub mod assistant;
/// Authentication boundary and local accounts.
pub mod auth;
/// Debounced single-writer autosave actor.
pub mod autosave;
/// Chapter list encoding inside a work's content field.
pub mod codec;
/// Editor configuration.
pub mod config;
/// Authoritative in-memory chapter buffer.
pub mod core;
/// Edits applied to the chapter buffer.
pub mod edit;
/// Streaming generation boundary.
pub mod generation;
/// Remote repository and local key-value storage.
pub mod persist;
/// Prompt assembly.
pub mod prompt;
/// Paced reveal of streamed text.
pub mod render;
/// Per-function assistant selection memory.
pub mod selection;
/// Shared primitive types and enums.
pub mod types;
/// Domain records.
pub mod work;
