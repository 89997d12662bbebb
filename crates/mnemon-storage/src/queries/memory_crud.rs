//! Insert, get, update, soft-delete, recover, and list ops for memories.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{ExtractionStatus, Memory, MemoryType};

use crate::now_rfc3339;

const MEMORY_COLUMNS: &str = "id, content, normalized_content, content_hash, memory_type,
    confidence, importance, pinned, source_type, source_id, source_path, source_section,
    extraction_status, extraction_model, embedding_model, is_deleted, deleted_at,
    updated_by, created_at, updated_at, vector_clock";

pub fn insert_memory(conn: &Connection, memory: &Memory) -> Result<(), StorageError> {
    let vector_clock = serde_json::to_string(&memory.vector_clock)
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO memories (
            id, content, normalized_content, content_hash, memory_type,
            confidence, importance, pinned, source_type, source_id, source_path,
            source_section, extraction_status, extraction_model, embedding_model,
            is_deleted, deleted_at, updated_by, created_at, updated_at, vector_clock
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21
        )",
        params![
            memory.id,
            memory.content,
            memory.normalized_content,
            memory.content_hash,
            memory.memory_type.as_str(),
            memory.confidence,
            memory.importance,
            memory.pinned as i32,
            memory.source_type,
            memory.source_id,
            memory.source_path,
            memory.source_section,
            memory.extraction_status.as_str(),
            memory.extraction_model,
            memory.embedding_model,
            memory.is_deleted as i32,
            memory.deleted_at.map(|t| t.to_rfc3339()),
            memory.updated_by,
            memory.created_at.to_rfc3339(),
            memory.updated_at.to_rfc3339(),
            vector_clock,
        ],
    )?;
    Ok(())
}

pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<Memory>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"
    ))?;
    let memory = stmt
        .query_row(params![id], row_to_memory)
        .optional()?;
    Ok(memory)
}

/// The live (non-deleted) memory carrying this content hash, if any.
pub fn get_live_by_hash(
    conn: &Connection,
    content_hash: &str,
) -> Result<Option<Memory>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE content_hash = ?1 AND is_deleted = 0"
    ))?;
    let memory = stmt
        .query_row(params![content_hash], row_to_memory)
        .optional()?;
    Ok(memory)
}

pub fn get_many(conn: &Connection, ids: &[String]) -> Result<Vec<Memory>, StorageError> {
    let mut out = Vec::with_capacity(ids.len());
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"
    ))?;
    for id in ids {
        if let Some(m) = stmt.query_row(params![id], row_to_memory).optional()? {
            out.push(m);
        }
    }
    Ok(out)
}

/// Replace content (and its derived columns) on a live memory.
pub fn update_content(
    conn: &Connection,
    id: &str,
    content: &str,
    normalized_content: &str,
    content_hash: &str,
    updated_by: &str,
) -> Result<(), StorageError> {
    let rows = conn.execute(
        "UPDATE memories SET
            content = ?2, normalized_content = ?3, content_hash = ?4,
            updated_by = ?5, updated_at = ?6
         WHERE id = ?1 AND is_deleted = 0",
        params![id, content, normalized_content, content_hash, updated_by, now_rfc3339()],
    )?;
    if rows == 0 {
        return Err(StorageError::NotFound {
            table: "memories",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Soft delete: tombstone with `deleted_at` set.
pub fn soft_delete(conn: &Connection, id: &str, updated_by: &str) -> Result<(), StorageError> {
    let now = now_rfc3339();
    let rows = conn.execute(
        "UPDATE memories SET is_deleted = 1, deleted_at = ?2, updated_by = ?3, updated_at = ?2
         WHERE id = ?1 AND is_deleted = 0",
        params![id, now, updated_by],
    )?;
    if rows == 0 {
        return Err(StorageError::NotFound {
            table: "memories",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Bring a tombstone back to life. Fails if another live memory has
/// claimed the same content hash in the meantime.
pub fn recover(conn: &Connection, id: &str, updated_by: &str) -> Result<(), StorageError> {
    let rows = conn.execute(
        "UPDATE memories SET is_deleted = 0, deleted_at = NULL, updated_by = ?2, updated_at = ?3
         WHERE id = ?1 AND is_deleted = 1",
        params![id, updated_by, now_rfc3339()],
    )?;
    if rows == 0 {
        return Err(StorageError::NotFound {
            table: "memories",
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn set_pinned(conn: &Connection, id: &str, pinned: bool) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE memories SET pinned = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, pinned as i32, now_rfc3339()],
    )?;
    Ok(())
}

pub fn set_extraction_status(
    conn: &Connection,
    id: &str,
    status: ExtractionStatus,
    model: Option<&str>,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE memories SET extraction_status = ?2, extraction_model = COALESCE(?3, extraction_model), updated_at = ?4
         WHERE id = ?1",
        params![id, status.as_str(), model, now_rfc3339()],
    )?;
    Ok(())
}

/// Keyset pagination over `(created_at, id)`: stable under concurrent
/// inserts, per the engine's cross-row ordering contract.
pub fn list_page(
    conn: &Connection,
    after: Option<(&str, &str)>,
    limit: usize,
) -> Result<Vec<Memory>, StorageError> {
    let mut out = Vec::new();
    match after {
        Some((created_at, id)) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE is_deleted = 0 AND (created_at, id) > (?1, ?2)
                 ORDER BY created_at, id LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![created_at, id, limit as i64], row_to_memory)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE is_deleted = 0 ORDER BY created_at, id LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_memory)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

/// Tombstones older than the cutoff, never pinned, oldest first.
pub fn expired_tombstones(
    conn: &Connection,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Memory>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE is_deleted = 1 AND pinned = 0 AND deleted_at < ?1
         ORDER BY deleted_at LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![cutoff.to_rfc3339(), limit as i64], row_to_memory)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Hard delete a tombstone and its index leftovers. The FTS delete
/// trigger fires here; embedding rows cascade via content hash unless a
/// live memory still shares it.
pub fn purge_tombstone(conn: &Connection, memory: &Memory) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM memory_entity_mentions WHERE memory_id = ?1",
        params![memory.id],
    )?;
    conn.execute(
        "DELETE FROM document_memories WHERE memory_id = ?1",
        params![memory.id],
    )?;
    conn.execute(
        "DELETE FROM session_memories WHERE memory_id = ?1",
        params![memory.id],
    )?;

    let live_sharers: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE content_hash = ?1 AND id != ?2 AND is_deleted = 0",
        params![memory.content_hash, memory.id],
        |r| r.get(0),
    )?;
    if live_sharers == 0 {
        if let Some(rowid) = crate::queries::embedding_ops::rowid_for_hash(conn, &memory.content_hash)? {
            crate::vector::delete_vec_row(conn, rowid).ok();
        }
        conn.execute(
            "DELETE FROM embeddings WHERE content_hash = ?1",
            params![memory.content_hash],
        )?;
    }

    conn.execute("DELETE FROM memories WHERE id = ?1", params![memory.id])?;
    Ok(())
}

pub(crate) fn row_to_memory(row: &Row<'_>) -> Result<Memory, rusqlite::Error> {
    let memory_type: String = row.get(4)?;
    let extraction_status: String = row.get(12)?;
    let deleted_at: Option<String> = row.get(16)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;
    let vector_clock: String = row.get(20)?;

    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        normalized_content: row.get(2)?,
        content_hash: row.get(3)?,
        memory_type: MemoryType::parse(&memory_type).unwrap_or(MemoryType::Fact),
        confidence: row.get(5)?,
        importance: row.get(6)?,
        pinned: row.get::<_, i32>(7)? != 0,
        source_type: row.get(8)?,
        source_id: row.get(9)?,
        source_path: row.get(10)?,
        source_section: row.get(11)?,
        extraction_status: ExtractionStatus::parse(&extraction_status),
        extraction_model: row.get(13)?,
        embedding_model: row.get(14)?,
        is_deleted: row.get::<_, i32>(15)? != 0,
        deleted_at: deleted_at.and_then(|t| parse_rfc3339(&t)),
        updated_by: row.get(17)?,
        created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_rfc3339(&updated_at).unwrap_or_else(Utc::now),
        vector_clock: serde_json::from_str(&vector_clock).unwrap_or_else(|_| HashMap::new()),
    })
}

pub(crate) fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
