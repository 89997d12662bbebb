//! Connector registrations and sync bookkeeping.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{Connector, ConnectorStatus};

use crate::now_rfc3339;
use crate::queries::memory_crud::parse_rfc3339;

pub fn upsert_connector(conn: &Connection, connector: &Connector) -> Result<(), StorageError> {
    let settings = serde_json::to_string(&connector.settings)
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    let cursor = serde_json::to_string(&connector.cursor)
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO connectors (id, provider, settings_json, cursor_json, status, last_sync_at, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            settings_json = excluded.settings_json,
            cursor_json = excluded.cursor_json,
            status = excluded.status,
            last_sync_at = excluded.last_sync_at,
            last_error = excluded.last_error",
        params![
            connector.id,
            connector.provider,
            settings,
            cursor,
            connector.status.as_str(),
            connector.last_sync_at.map(|t| t.to_rfc3339()),
            connector.last_error,
        ],
    )?;
    Ok(())
}

pub fn get_connector(conn: &Connection, id: &str) -> Result<Option<Connector>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, provider, settings_json, cursor_json, status, last_sync_at, last_error
         FROM connectors WHERE id = ?1",
    )?;
    let connector = stmt.query_row(params![id], row_to_connector).optional()?;
    Ok(connector)
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: ConnectorStatus,
    error: Option<&str>,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE connectors SET status = ?2, last_error = ?3,
            last_sync_at = CASE WHEN ?2 = 'idle' THEN ?4 ELSE last_sync_at END
         WHERE id = ?1",
        params![id, status.as_str(), error, now_rfc3339()],
    )?;
    Ok(())
}

/// Connector health counters for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ConnectorCounters {
    pub total: u64,
    pub syncing: u64,
    pub errored: u64,
    pub oldest_error_age_secs: Option<i64>,
}

pub fn connector_counters(conn: &Connection) -> Result<ConnectorCounters, StorageError> {
    let mut counters = ConnectorCounters {
        total: conn.query_row("SELECT COUNT(*) FROM connectors", [], |r| r.get(0))?,
        ..Default::default()
    };
    counters.syncing = conn.query_row(
        "SELECT COUNT(*) FROM connectors WHERE status = 'syncing'",
        [],
        |r| r.get(0),
    )?;
    counters.errored = conn.query_row(
        "SELECT COUNT(*) FROM connectors WHERE status = 'error'",
        [],
        |r| r.get(0),
    )?;
    let oldest_error: Option<String> = conn
        .query_row(
            "SELECT MIN(last_sync_at) FROM connectors WHERE status = 'error'",
            [],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    counters.oldest_error_age_secs = oldest_error
        .and_then(|t| parse_rfc3339(&t))
        .map(|t| (Utc::now() - t).num_seconds());
    Ok(counters)
}

/// Open a cursor-journal row for a sync run. Returns the journal id.
pub fn begin_sync_journal(
    conn: &Connection,
    connector_id: &str,
    cursor: &serde_json::Value,
) -> Result<String, StorageError> {
    let id = uuid::Uuid::new_v4().to_string();
    let cursor = serde_json::to_string(cursor)
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO ingestion_jobs (id, connector_id, cursor_json, started_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, connector_id, cursor, now_rfc3339()],
    )?;
    Ok(id)
}

/// Close a sync run with its high-water cursor and counts.
pub fn finish_sync_journal(
    conn: &Connection,
    journal_id: &str,
    cursor: &serde_json::Value,
    items_seen: u64,
    items_ingested: u64,
) -> Result<(), StorageError> {
    let cursor = serde_json::to_string(cursor)
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    conn.execute(
        "UPDATE ingestion_jobs
         SET cursor_json = ?2, items_seen = ?3, items_ingested = ?4, finished_at = ?5
         WHERE id = ?1",
        params![journal_id, cursor, items_seen, items_ingested, now_rfc3339()],
    )?;
    // The connector row carries the same high-water mark for resume.
    conn.execute(
        "UPDATE connectors SET cursor_json = ?2
         WHERE id = (SELECT connector_id FROM ingestion_jobs WHERE id = ?1)",
        params![journal_id, cursor],
    )?;
    Ok(())
}

fn row_to_connector(row: &Row<'_>) -> Result<Connector, rusqlite::Error> {
    let settings: String = row.get(2)?;
    let cursor: String = row.get(3)?;
    let status: String = row.get(4)?;
    let last_sync_at: Option<String> = row.get(5)?;
    Ok(Connector {
        id: row.get(0)?,
        provider: row.get(1)?,
        settings: serde_json::from_str(&settings).unwrap_or(serde_json::Value::Null),
        cursor: serde_json::from_str(&cursor).unwrap_or(serde_json::Value::Null),
        status: ConnectorStatus::parse(&status),
        last_sync_at: last_sync_at.and_then(|t| parse_rfc3339(&t)),
        last_error: row.get(6)?,
    })
}
