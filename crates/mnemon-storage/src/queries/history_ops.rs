//! Append-only audit rows. Nothing here ever updates or deletes.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{HistoryEvent, HistoryRecord};

use crate::queries::memory_crud::parse_rfc3339;

pub fn append(conn: &Connection, record: &HistoryRecord) -> Result<(), StorageError> {
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO memory_history (
            id, memory_id, event, new_content, changed_by, reason, metadata_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.memory_id,
            record.event.as_str(),
            record.new_content,
            record.changed_by,
            record.reason,
            metadata,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn for_memory(conn: &Connection, memory_id: &str) -> Result<Vec<HistoryRecord>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, event, new_content, changed_by, reason, metadata_json, created_at
         FROM memory_history WHERE memory_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![memory_id], row_to_record)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Count events of one kind over the trailing `days`.
pub fn count_events_since_days(
    conn: &Connection,
    event: HistoryEvent,
    days: i64,
) -> Result<u64, StorageError> {
    let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM memory_history WHERE event = ?1 AND created_at >= ?2",
        params![event.as_str(), cutoff],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn row_to_record(row: &Row<'_>) -> Result<HistoryRecord, rusqlite::Error> {
    let event: String = row.get(2)?;
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        event: HistoryEvent::parse(&event),
        new_content: row.get(3)?,
        changed_by: row.get(4)?,
        reason: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
    })
}
