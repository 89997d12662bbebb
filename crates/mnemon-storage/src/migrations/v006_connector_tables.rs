//! Connector registrations and their per-sync cursor journal.

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE connectors (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            settings_json TEXT NOT NULL DEFAULT 'null',
            cursor_json TEXT NOT NULL DEFAULT 'null',
            status TEXT NOT NULL DEFAULT 'idle',
            last_sync_at TEXT,
            last_error TEXT
        );

        CREATE TABLE ingestion_jobs (
            id TEXT PRIMARY KEY,
            connector_id TEXT NOT NULL,
            cursor_json TEXT NOT NULL,
            items_seen INTEGER NOT NULL DEFAULT 0,
            items_ingested INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            finished_at TEXT
        );
        CREATE INDEX idx_ingestion_jobs_connector
            ON ingestion_jobs(connector_id, started_at);",
    )?;
    Ok(())
}
