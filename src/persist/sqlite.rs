//! SQLite-backed implementation of [`crate::persist::WorkRepository`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;

use crate::{
    types::{FunctionType, WorkId},
    work::{
        Archive, ArchiveCategory, KeyAssignment, KeyPoolEntry, PromptTemplate, TemplateContent, Work,
        WorkDraft,
    },
};

use super::{PersistError, PersistResult, WorkRepository};

/// Local stand-in for the hosted tables, backed by one SQLite connection.
///
/// Every call runs on the blocking pool so the editor's tasks never wait on
/// disk I/O directly.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Opens or creates a database at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> PersistResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> PersistResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| PersistError::Join(e.to_string()))?
    }

    /// Stores a template body as-is; classification happens on read.
    pub async fn insert_template(
        &self,
        title: impl Into<String>,
        raw_content: impl Into<String>,
        function: FunctionType,
    ) -> PersistResult<PromptTemplate> {
        let title = title.into();
        let raw = raw_content.into();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO prompt_templates(title, content, function) VALUES (?1, ?2, ?3)",
                params![title, raw, function.as_str()],
            )?;
            let id = conn.last_insert_rowid();
            Ok(PromptTemplate {
                id,
                content: TemplateContent::classify(id, &raw),
                title,
                function,
            })
        })
        .await
    }

    /// Attaches a reference archive to a work.
    pub async fn insert_archive(
        &self,
        work_id: WorkId,
        title: impl Into<String>,
        content: impl Into<String>,
        category: ArchiveCategory,
    ) -> PersistResult<Archive> {
        let title = title.into();
        let content = content.into();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO archives(work_id, title, content, category) VALUES (?1, ?2, ?3, ?4)",
                params![work_id, title, content, category.as_stored()],
            )?;
            Ok(Archive {
                id: conn.last_insert_rowid(),
                work_id,
                title,
                content,
                category,
            })
        })
        .await
    }

    /// Adds an active key to the pool.
    pub async fn insert_pool_key(&self, api_key: impl Into<String>) -> PersistResult<KeyPoolEntry> {
        let api_key = api_key.into();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO api_key_pool(api_key, usage_count, is_active) VALUES (?1, 0, 1)",
                params![api_key],
            )?;
            Ok(KeyPoolEntry {
                id: conn.last_insert_rowid(),
                api_key,
                usage_count: 0,
                is_active: true,
            })
        })
        .await
    }

    /// Returns the user's assignment, assigning the least-used active key
    /// first if the user has none. `None` when the pool has no active key.
    pub async fn assign_key(&self, user_id: impl Into<String>) -> PersistResult<Option<KeyAssignment>> {
        let user_id = user_id.into();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if let Some(existing) = select_assignment(&tx, &user_id)? {
                return Ok(Some(existing));
            }

            let key_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM api_key_pool WHERE is_active = 1 ORDER BY usage_count ASC, id ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(key_id) = key_id else {
                return Ok(None);
            };

            tx.execute(
                "INSERT INTO user_api_key_assignments(user_id, key_id, usage_count, last_used, assigned_at) \
                 VALUES (?1, ?2, 0, NULL, ?3)",
                params![user_id, key_id, Utc::now().to_rfc3339()],
            )?;
            let assignment = select_assignment(&tx, &user_id)?;
            tx.commit()?;
            Ok(assignment)
        })
        .await
    }
}

#[async_trait]
impl WorkRepository for SqliteRepository {
    async fn get_work_by_id(&self, id: WorkId) -> PersistResult<Option<Work>> {
        self.run(move |conn| {
            let work = conn
                .query_row(
                    "SELECT id, title, kind, content, updated_at FROM works WHERE id = ?1",
                    params![id],
                    work_from_row,
                )
                .optional()?;
            Ok(work)
        })
        .await
    }

    async fn update_work(&self, work: &Work) -> PersistResult<Work> {
        let work = work.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE works SET title = ?2, kind = ?3, content = ?4, updated_at = ?5 WHERE id = ?1",
                params![
                    work.id,
                    work.title,
                    work.kind,
                    work.content,
                    work.updated_at.to_rfc3339()
                ],
            )?;
            if changed == 0 {
                return Err(PersistError::MissingWork(work.id));
            }
            Ok(work)
        })
        .await
    }

    async fn create_work(&self, draft: WorkDraft) -> PersistResult<Work> {
        self.run(move |conn| {
            let updated_at = Utc::now();
            conn.execute(
                "INSERT INTO works(title, kind, content, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![draft.title, draft.kind, draft.content, updated_at.to_rfc3339()],
            )?;
            Ok(Work {
                id: conn.last_insert_rowid(),
                title: draft.title,
                kind: draft.kind,
                content: draft.content,
                updated_at,
            })
        })
        .await
    }

    async fn templates_for(&self, function: FunctionType) -> PersistResult<Vec<PromptTemplate>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, content FROM prompt_templates WHERE function = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![function.as_str()], |row| {
                let id: i64 = row.get(0)?;
                let raw: String = row.get(2)?;
                Ok(PromptTemplate {
                    id,
                    title: row.get(1)?,
                    content: TemplateContent::classify(id, &raw),
                    function,
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn archives_for_work(&self, work_id: WorkId) -> PersistResult<Vec<Archive>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, work_id, title, content, category FROM archives WHERE work_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![work_id], |row| {
                let category: String = row.get(4)?;
                Ok(Archive {
                    id: row.get(0)?,
                    work_id: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    category: ArchiveCategory::from_stored(&category),
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn key_pool(&self) -> PersistResult<Vec<KeyPoolEntry>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, api_key, usage_count, is_active FROM api_key_pool ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                let usage: i64 = row.get(2)?;
                let active: i64 = row.get(3)?;
                Ok(KeyPoolEntry {
                    id: row.get(0)?,
                    api_key: row.get(1)?,
                    usage_count: usage.max(0) as u64,
                    is_active: active != 0,
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn key_assignment(&self, user_id: &str) -> PersistResult<Option<KeyAssignment>> {
        let user_id = user_id.to_string();
        self.run(move |conn| select_assignment(conn, &user_id)).await
    }

    async fn increment_key_usage(&self, user_id: &str) -> PersistResult<bool> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let key_id: Option<i64> = tx
                .query_row(
                    "SELECT key_id FROM user_api_key_assignments WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(key_id) = key_id else {
                return Ok(false);
            };

            tx.execute(
                "UPDATE user_api_key_assignments SET usage_count = usage_count + 1, last_used = ?2 WHERE user_id = ?1",
                params![user_id, Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "UPDATE api_key_pool SET usage_count = usage_count + 1 WHERE id = ?1",
                params![key_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }
}

fn select_assignment(conn: &Connection, user_id: &str) -> PersistResult<Option<KeyAssignment>> {
    let assignment = conn
        .query_row(
            "SELECT id, user_id, key_id, usage_count, last_used, assigned_at \
             FROM user_api_key_assignments WHERE user_id = ?1",
            params![user_id],
            |row| {
                let usage: i64 = row.get(3)?;
                let last_used: Option<String> = row.get(4)?;
                let assigned_at: String = row.get(5)?;
                Ok(KeyAssignment {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    key_id: row.get(2)?,
                    usage_count: usage.max(0) as u64,
                    last_used: last_used.map(|s| parse_timestamp(4, &s)).transpose()?,
                    assigned_at: parse_timestamp(5, &assigned_at)?,
                })
            },
        )
        .optional()?;
    Ok(assignment)
}

fn work_from_row(row: &Row<'_>) -> rusqlite::Result<Work> {
    let updated_at: String = row.get(4)?;
    Ok(Work {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: row.get(2)?,
        content: row.get(3)?,
        updated_at: parse_timestamp(4, &updated_at)?,
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
        })
}
