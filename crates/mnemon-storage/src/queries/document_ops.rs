//! Document envelopes and their memory link rows.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{Document, DocumentMemory, DocumentStatus};

use crate::now_rfc3339;
use crate::queries::memory_crud::parse_rfc3339;

const DOCUMENT_COLUMNS: &str = "id, source_url, source_type, title, raw_content, status,
    chunk_count, memory_count, connector_id, created_at, updated_at";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO documents (
            id, source_url, source_type, title, raw_content, status,
            chunk_count, memory_count, connector_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            doc.id,
            doc.source_url,
            doc.source_type,
            doc.title,
            doc.raw_content,
            doc.status.as_str(),
            doc.chunk_count,
            doc.memory_count,
            doc.connector_id,
            doc.created_at.to_rfc3339(),
            doc.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &str) -> Result<Option<Document>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;
    let doc = stmt.query_row(params![id], row_to_document).optional()?;
    Ok(doc)
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: DocumentStatus,
) -> Result<(), StorageError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), now_rfc3339()],
    )?;
    if rows == 0 {
        return Err(StorageError::NotFound {
            table: "documents",
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn set_counts(
    conn: &Connection,
    id: &str,
    chunk_count: u32,
    memory_count: u32,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE documents SET chunk_count = ?2, memory_count = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, chunk_count, memory_count, now_rfc3339()],
    )?;
    Ok(())
}

pub fn link_memory(conn: &Connection, link: &DocumentMemory) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO document_memories (document_id, memory_id, chunk_index)
         VALUES (?1, ?2, ?3)",
        params![link.document_id, link.memory_id, link.chunk_index],
    )?;
    Ok(())
}

/// Content hashes of memories already derived from this document:
/// the per-chunk dedup set for re-ingest.
pub fn linked_content_hashes(
    conn: &Connection,
    document_id: &str,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT m.content_hash FROM document_memories dm
         JOIN memories m ON m.id = dm.memory_id
         WHERE dm.document_id = ?1",
    )?;
    let rows = stmt.query_map(params![document_id], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_document(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(Document {
        id: row.get(0)?,
        source_url: row.get(1)?,
        source_type: row.get(2)?,
        title: row.get(3)?,
        raw_content: row.get(4)?,
        status: DocumentStatus::parse(&status),
        chunk_count: row.get(6)?,
        memory_count: row.get(7)?,
        connector_id: row.get(8)?,
        created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_rfc3339(&updated_at).unwrap_or_else(Utc::now),
    })
}
