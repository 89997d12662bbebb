//! Embedding rows and their paired vec index entries.
//! UPSERT keyed on `content_hash`; the vec row reuses the embeddings
//! rowid so the pair stays stable across updates.

use rusqlite::{params, Connection, OptionalExtension};

use mnemon_core::errors::StorageError;

use crate::now_rfc3339;
use crate::vector;

/// Upsert an embedding and, when the vector index is enabled, its vec
/// row. Returns the embeddings rowid.
pub fn upsert_embedding(
    conn: &Connection,
    content_hash: &str,
    vector_data: &[f32],
    source_type: Option<&str>,
    source_id: Option<&str>,
    vector_index_enabled: bool,
) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO embeddings (content_hash, vector, dimensions, source_type, source_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(content_hash) DO UPDATE SET
            vector = excluded.vector,
            dimensions = excluded.dimensions,
            source_type = excluded.source_type,
            source_id = excluded.source_id",
        params![
            content_hash,
            vector::vec_to_blob(vector_data),
            vector_data.len() as i64,
            source_type,
            source_id,
            now_rfc3339(),
        ],
    )?;

    let rowid: i64 = conn.query_row(
        "SELECT id FROM embeddings WHERE content_hash = ?1",
        params![content_hash],
        |row| row.get(0),
    )?;

    if vector_index_enabled {
        vector::upsert_vec_row(conn, rowid, vector_data)?;
    }
    Ok(rowid)
}

pub fn rowid_for_hash(conn: &Connection, content_hash: &str) -> Result<Option<i64>, StorageError> {
    let rowid = conn
        .query_row(
            "SELECT id FROM embeddings WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get(0),
        )
        .optional()?;
    Ok(rowid)
}

pub fn get_vector(conn: &Connection, content_hash: &str) -> Result<Option<Vec<f32>>, StorageError> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT vector FROM embeddings WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get(0),
        )
        .optional()?;
    Ok(blob.map(|b| vector::blob_to_vec(&b)))
}

/// `(embeddings, live memories with an embedding)` for coverage scoring.
pub fn coverage_counts(conn: &Connection) -> Result<(u64, u64), StorageError> {
    let embeddings: u64 =
        conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
    let covered: u64 = conn.query_row(
        "SELECT COUNT(*) FROM memories m
         WHERE m.is_deleted = 0
           AND EXISTS (SELECT 1 FROM embeddings e WHERE e.content_hash = m.content_hash)",
        [],
        |r| r.get(0),
    )?;
    Ok((embeddings, covered))
}
