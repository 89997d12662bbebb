//! Session feedback rows consumed by the summary worker.

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE session_memories (
            session_key TEXT NOT NULL,
            memory_id TEXT NOT NULL,
            rank INTEGER NOT NULL,
            relevance REAL,
            PRIMARY KEY (session_key, memory_id)
        );
        CREATE INDEX idx_session_memories_memory ON session_memories(memory_id);

        CREATE TABLE session_scores (
            session_key TEXT NOT NULL,
            score REAL NOT NULL,
            rationale TEXT,
            created_at TEXT NOT NULL,
            PRIMARY KEY (session_key, created_at)
        );",
    )?;
    Ok(())
}
