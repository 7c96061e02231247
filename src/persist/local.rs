//! Device-local key/value storage for UI preferences and selection memory.
//!
//! Values are plain strings under fixed key patterns. Nothing here is synced
//! across devices.

use std::path::Path;
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use rusqlite::{Connection, OptionalExtension, params};

use crate::types::{SortOrder, WorkId};

use super::{PersistError, PersistResult};

/// Key for the chapter sidebar collapsed flag.
pub const SIDEBAR_COLLAPSED_KEY: &str = "sidebar_collapsed";
/// Key for the fixed page-width (A4) editor mode.
pub const PAGE_WIDTH_MODE_KEY: &str = "editor_a4_width_mode";

/// Key holding a work's chapter sort order.
pub fn chapter_order_key(work_id: WorkId) -> String {
    format!("work_{work_id}_chapter_order")
}

/// Synchronous string storage.
pub trait LocalStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> PersistResult<Option<String>>;
    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> PersistResult<()>;
    /// Deletes a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> PersistResult<()>;
}

/// Process-lifetime store, used in tests and as a fallback.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PersistResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| PersistError::Message("local store lock poisoned".to_string()))
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Durable store in its own SQLite file.
pub struct SqliteLocalStore {
    conn: Mutex<Connection>,
}

impl SqliteLocalStore {
    /// Opens or creates the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Store that lives as long as the value.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS local_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> PersistResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PersistError::Message("local store lock poisoned".to_string()))
    }
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM local_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO local_kv(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM local_kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Typed access to the layout preferences kept in a [`LocalStore`].
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn LocalStore>,
}

impl Preferences {
    /// Preferences backed by `store`.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Whether the chapter sidebar is collapsed. False when never set.
    pub fn sidebar_collapsed(&self) -> PersistResult<bool> {
        self.flag(SIDEBAR_COLLAPSED_KEY)
    }

    /// Stores the sidebar state.
    pub fn set_sidebar_collapsed(&self, collapsed: bool) -> PersistResult<()> {
        self.store.set(SIDEBAR_COLLAPSED_KEY, bool_str(collapsed))
    }

    /// Whether the editor uses the page-width layout.
    pub fn page_width_mode(&self) -> PersistResult<bool> {
        self.flag(PAGE_WIDTH_MODE_KEY)
    }

    /// Flips the page-width mode and returns the new value.
    pub fn toggle_page_width_mode(&self) -> PersistResult<bool> {
        let next = !self.page_width_mode()?;
        self.store.set(PAGE_WIDTH_MODE_KEY, bool_str(next))?;
        Ok(next)
    }

    /// Sort order for a work's chapter list, ascending when never set.
    pub fn chapter_order(&self, work_id: WorkId) -> PersistResult<SortOrder> {
        Ok(self
            .store
            .get(&chapter_order_key(work_id))?
            .map(|v| SortOrder::from_stored(&v))
            .unwrap_or_default())
    }

    /// Stores the chapter list order for one work.
    pub fn set_chapter_order(&self, work_id: WorkId, order: SortOrder) -> PersistResult<()> {
        self.store.set(&chapter_order_key(work_id), order.as_str())
    }

    fn flag(&self, key: &str) -> PersistResult<bool> {
        Ok(self.store.get(key)?.is_some_and(|v| v == "true"))
    }
}

fn bool_str(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}
