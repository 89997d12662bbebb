//! Migration runner — version tracking, forward-only, transactional per
//! migration. A failed migration rolls back, leaves the pre-migration
//! backup in place, and is fatal to startup.

mod v001_initial_schema;
mod v002_fts_index;
mod v003_embedding_tables;
mod v004_graph_tables;
mod v005_session_tables;
mod v006_connector_tables;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use mnemon_core::errors::StorageError;

use crate::to_storage_err;

/// Total number of migrations.
pub const LATEST_VERSION: u32 = 6;

type MigrationFn = fn(&Connection) -> Result<(), StorageError>;

const MIGRATIONS: [(u32, &str, MigrationFn); 6] = [
    (1, "initial_schema", v001_initial_schema::migrate),
    (2, "fts_index", v002_fts_index::migrate),
    (3, "embedding_tables", v003_embedding_tables::migrate),
    (4, "graph_tables", v004_graph_tables::migrate),
    (5, "session_tables", v005_session_tables::migrate),
    (6, "connector_tables", v006_connector_tables::migrate),
];

/// Get the current schema version from the database.
/// Returns 0 if the schema_migrations table doesn't exist yet.
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'")
        .and_then(|mut stmt| stmt.exists([]))?;

    if !exists {
        return Ok(0);
    }

    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// True if opening this database would apply at least one migration.
pub fn has_pending(conn: &Connection) -> Result<bool, StorageError> {
    Ok(current_version(conn)? < LATEST_VERSION)
}

/// Run all pending migrations. Forward-only, each wrapped in a
/// transaction. Returns the number applied.
pub fn run_migrations(conn: &Connection) -> Result<u32, StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )?;

    let current = current_version(conn)?;
    let mut applied = 0;

    if current >= LATEST_VERSION {
        debug!("database schema is up to date (v{current})");
        return Ok(0);
    }

    info!("running migrations: v{} → v{}", current, LATEST_VERSION);

    for &(version, name, migrate_fn) in &MIGRATIONS {
        if version <= current {
            continue;
        }

        debug!("applying migration v{version:03}: {name}");

        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| to_storage_err(format!("begin transaction for v{version:03}: {e}")))?;

        match migrate_fn(conn) {
            Ok(()) => {
                conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
                    .map_err(|e| to_storage_err(format!("record version v{version:03}: {e}")))?;

                conn.execute_batch("COMMIT")
                    .map_err(|e| to_storage_err(format!("commit v{version:03}: {e}")))?;

                info!("applied migration v{version:03}: {name}");
                applied += 1;
            }
            Err(e) => {
                warn!("migration v{version:03} failed: {e}, rolling back");
                let _ = conn.execute_batch("ROLLBACK");
                return Err(StorageError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, LATEST_VERSION);
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent_at_latest() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }
}
