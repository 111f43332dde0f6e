//! Saved message store
//!
//! Records keyed by (thread id, name), persisted in SQLite so they survive
//! restarts. Every statement binds its inputs as parameters.

mod schema;

pub use schema::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Saved message not found: {0}")]
    MessageNotFound(String),
    #[error("Database task failed: {0}")]
    Task(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.connection().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Save a message body, replacing any previous body under the same name
    pub fn save_message(&self, thread_id: &str, name: &str, body: &str) -> DbResult<SavedMessage> {
        let now = Utc::now();
        self.connection().execute(
            "INSERT INTO saved_messages (thread_id, name, body, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(thread_id, name) DO UPDATE SET body = excluded.body, created_at = excluded.created_at",
            params![thread_id, name, body, now.to_rfc3339()],
        )?;

        Ok(SavedMessage {
            thread_id: thread_id.to_string(),
            name: name.to_string(),
            body: body.to_string(),
            created_at: now,
        })
    }

    /// Get a saved message by name
    pub fn get_message(&self, thread_id: &str, name: &str) -> DbResult<SavedMessage> {
        let conn = self.connection();
        conn.query_row(
            "SELECT thread_id, name, body, created_at FROM saved_messages
             WHERE thread_id = ?1 AND name = ?2",
            params![thread_id, name],
            |row| {
                Ok(SavedMessage {
                    thread_id: row.get(0)?,
                    name: row.get(1)?,
                    body: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| DbError::MessageNotFound(name.to_string()))
    }

    /// Delete a saved message. Returns whether a record existed.
    pub fn delete_message(&self, thread_id: &str, name: &str) -> DbResult<bool> {
        let deleted = self.connection().execute(
            "DELETE FROM saved_messages WHERE thread_id = ?1 AND name = ?2",
            params![thread_id, name],
        )?;
        Ok(deleted > 0)
    }

    /// List saved messages for a thread, oldest first
    pub fn list_messages(&self, thread_id: &str) -> DbResult<Vec<SavedMessage>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT thread_id, name, body, created_at FROM saved_messages
             WHERE thread_id = ?1
             ORDER BY created_at ASC, name ASC",
        )?;

        let rows = stmt.query_map(params![thread_id], |row| {
            Ok(SavedMessage {
                thread_id: row.get(0)?,
                name: row.get(1)?,
                body: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// CRUD capability over saved messages, as used by subroutines
#[async_trait]
pub trait SavedMessages: Send + Sync {
    async fn save(&self, thread_id: &str, name: &str, body: &str) -> DbResult<()>;
    async fn get(&self, thread_id: &str, name: &str) -> DbResult<String>;
    async fn delete(&self, thread_id: &str, name: &str) -> DbResult<bool>;
    async fn names(&self, thread_id: &str) -> DbResult<Vec<String>>;
}

/// Runs blocking SQLite work off the async executor
#[async_trait]
impl SavedMessages for Database {
    async fn save(&self, thread_id: &str, name: &str, body: &str) -> DbResult<()> {
        let db = self.clone();
        let (thread_id, name, body) = (thread_id.to_string(), name.to_string(), body.to_string());
        run_blocking(move || db.save_message(&thread_id, &name, &body).map(|_| ())).await
    }

    async fn get(&self, thread_id: &str, name: &str) -> DbResult<String> {
        let db = self.clone();
        let (thread_id, name) = (thread_id.to_string(), name.to_string());
        run_blocking(move || db.get_message(&thread_id, &name).map(|m| m.body)).await
    }

    async fn delete(&self, thread_id: &str, name: &str) -> DbResult<bool> {
        let db = self.clone();
        let (thread_id, name) = (thread_id.to_string(), name.to_string());
        run_blocking(move || db.delete_message(&thread_id, &name)).await
    }

    async fn names(&self, thread_id: &str) -> DbResult<Vec<String>> {
        let db = self.clone();
        let thread_id = thread_id.to_string();
        run_blocking(move || {
            db.list_messages(&thread_id)
                .map(|messages| messages.into_iter().map(|m| m.name).collect())
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DbResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(DbError::Task(e.to_string())),
    }
}
