//! Embedding rows. The paired `vec_embeddings` virtual index is ensured
//! at startup (its dimension comes from config, not the schema version).

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE embeddings (
            id INTEGER PRIMARY KEY,
            content_hash TEXT NOT NULL UNIQUE,
            vector BLOB NOT NULL,
            dimensions INTEGER NOT NULL,
            source_type TEXT,
            source_id TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_embeddings_source ON embeddings(source_type, source_id);",
    )?;
    Ok(())
}
