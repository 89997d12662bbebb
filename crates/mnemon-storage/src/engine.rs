//! `StorageEngine` — the single owner of database connections.
//!
//! Wraps the `Accessor` (write serialization + read pool) and runs the
//! one-shot startup sequence: data dir, pre-migration backup, forward
//! migrations, FTS self-heal, vector index ensure + backfill. No code
//! outside this crate touches a raw `Connection` except through the
//! `with_read` / `with_write_tx` closures.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{info, warn};

use mnemon_core::config::StorageConfig;
use mnemon_core::errors::StorageError;

use crate::accessor::Accessor;
use crate::{backup, fts, migrations, vector};

pub struct StorageEngine {
    accessor: Arc<Accessor>,
    vector_enabled: bool,
    vector_dimensions: usize,
}

impl StorageEngine {
    /// Open a file-backed engine, running the full startup sequence.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.summaries_dir())?;

        let db_path = config.db_path();
        let db_existed = db_path.exists();
        let accessor = Accessor::open(&db_path, config.read_pool_size, config.busy_timeout_ms)?;

        let vector_dimensions = config.vector_dimensions;
        let max_backups = config.max_backups;
        let vector_enabled = accessor.with_writer_raw(|conn| {
            startup(conn, &db_path, db_existed, max_backups, vector_dimensions)
        })?;

        Ok(Self {
            accessor: Arc::new(accessor),
            vector_enabled,
            vector_dimensions,
        })
    }

    /// In-memory engine for tests; same startup sequence minus backups.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_in_memory_with_dimensions(768)
    }

    pub fn open_in_memory_with_dimensions(dimensions: usize) -> Result<Self, StorageError> {
        let accessor = Accessor::open_in_memory()?;
        let vector_enabled = accessor.with_writer_raw(|conn| {
            migrations::run_migrations(conn)?;
            fts::self_heal(conn)?;
            vector::ensure_index(conn, dimensions)
        })?;
        Ok(Self {
            accessor: Arc::new(accessor),
            vector_enabled,
            vector_dimensions: dimensions,
        })
    }

    pub fn accessor(&self) -> &Arc<Accessor> {
        &self.accessor
    }

    /// True when the vec0 extension initialized and the index exists.
    pub fn vector_enabled(&self) -> bool {
        self.vector_enabled
    }

    pub fn vector_dimensions(&self) -> usize {
        self.vector_dimensions
    }

    pub fn with_read<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.accessor.with_read(f)
    }

    pub fn with_write_tx<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.accessor.with_write_tx(f)
    }

    /// Idempotent shutdown: checkpoint + close all connections.
    pub fn close(&self) {
        self.accessor.close();
    }
}

fn startup(
    conn: &Connection,
    db_path: &Path,
    db_existed: bool,
    max_backups: usize,
    vector_dimensions: usize,
) -> Result<bool, StorageError> {
    let current = migrations::current_version(conn)?;
    if db_existed && current < migrations::LATEST_VERSION {
        match backup::backup_before_migration(conn, db_path, current, max_backups) {
            Ok(path) => info!("pre-migration backup at {}", path.display()),
            // A failed backup blocks the migration: the whole point is
            // having a restore point if the migration goes wrong.
            Err(e) => return Err(e),
        }
    }

    migrations::run_migrations(conn)?;

    if fts::self_heal(conn)? {
        warn!("memories_fts was missing and has been rebuilt");
    }

    vector::ensure_index(conn, vector_dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_migrates() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let version = engine
            .with_read(|conn| migrations::current_version(conn))
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION);
    }

    #[test]
    fn test_open_on_disk_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let engine = StorageEngine::open(&config).unwrap();
        assert!(config.db_path().exists());
        assert!(config.summaries_dir().exists());
        engine.close();

        // Re-open on an up-to-date schema: no backup is taken.
        let engine = StorageEngine::open(&config).unwrap();
        engine.close();
        let backups = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bak-v"))
            .count();
        assert_eq!(backups, 0);
    }
}
