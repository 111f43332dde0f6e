//! Database schema and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS saved_messages (
    thread_id TEXT NOT NULL,
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (thread_id, name)
);

CREATE INDEX IF NOT EXISTS idx_saved_messages_thread ON saved_messages(thread_id, created_at);
";

/// A message saved under a name within a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMessage {
    pub thread_id: String,
    pub name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
