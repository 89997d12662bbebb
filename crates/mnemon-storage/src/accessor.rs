//! Single-writer accessor with a bounded read pool.
//!
//! All writes funnel through `with_write_tx` (BEGIN IMMEDIATE … COMMIT /
//! ROLLBACK); reads borrow pooled connections against WAL snapshots.
//! Never run provider calls or other unbounded latency inside
//! `with_write_tx`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use mnemon_core::errors::StorageError;

/// Pragmas applied to the writer at open.
fn apply_writer_pragmas(conn: &Connection, busy_timeout_ms: u32) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA busy_timeout = {busy_timeout_ms};\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;"
    ))?;
    Ok(())
}

/// Pragmas for read-only pool connections. Journal mode is a property of
/// the database file and is already WAL by the time a reader opens.
fn apply_reader_pragmas(conn: &Connection, busy_timeout_ms: u32) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "PRAGMA busy_timeout = {busy_timeout_ms};\n\
         PRAGMA temp_store = MEMORY;"
    ))?;
    Ok(())
}

/// Owns the engine's connections. Exactly one writer exists for the
/// accessor's lifetime; readers are pooled up to `pool_size`.
pub struct Accessor {
    writer: Mutex<Option<Connection>>,
    readers: Mutex<Vec<Connection>>,
    path: Option<PathBuf>,
    pool_size: usize,
    busy_timeout_ms: u32,
    closed: AtomicBool,
}

impl Accessor {
    /// Open a file-backed accessor. The writer connection is opened
    /// eagerly; readers are opened lazily up to the pool bound.
    pub fn open(
        path: &Path,
        pool_size: usize,
        busy_timeout_ms: u32,
    ) -> Result<Self, StorageError> {
        crate::vector::register_vec_extension();
        let writer = Connection::open(path)?;
        apply_writer_pragmas(&writer, busy_timeout_ms)?;
        Ok(Self {
            writer: Mutex::new(Some(writer)),
            readers: Mutex::new(Vec::new()),
            path: Some(path.to_path_buf()),
            pool_size,
            busy_timeout_ms,
            closed: AtomicBool::new(false),
        })
    }

    /// Open an in-memory accessor for tests. Reads route to the single
    /// shared connection.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        crate::vector::register_vec_extension();
        let writer = Connection::open_in_memory()?;
        writer.execute_batch("PRAGMA temp_store = MEMORY;")?;
        Ok(Self {
            writer: Mutex::new(Some(writer)),
            readers: Mutex::new(Vec::new()),
            path: None,
            pool_size: 0,
            busy_timeout_ms: 5000,
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` inside a write transaction. `BEGIN IMMEDIATE` on entry;
    /// `COMMIT` on success, `ROLLBACK` on error with the original error
    /// re-surfaced. Only one write is in flight at a time.
    pub fn with_write_tx<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self
            .writer
            .lock()
            .map_err(|_| crate::to_storage_err("writer mutex poisoned".into()))?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = conn.execute_batch("ROLLBACK") {
                    warn!("rollback failed after write error: {rb}");
                }
                Err(e)
            }
        }
    }

    /// Run `f` on the writer connection without opening a transaction.
    /// For startup DDL and pragma work only.
    pub fn with_writer_raw<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self
            .writer
            .lock()
            .map_err(|_| crate::to_storage_err("writer mutex poisoned".into()))?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    /// Run `f` on a pooled read connection. Overflow handles beyond the
    /// pool bound are closed on return.
    pub fn with_read<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        let Some(path) = &self.path else {
            // In-memory databases are private to their connection; route
            // reads through the writer.
            return self.with_writer_raw(f);
        };

        let pooled = {
            let mut pool = self
                .readers
                .lock()
                .map_err(|_| crate::to_storage_err("reader pool mutex poisoned".into()))?;
            pool.pop()
        };
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                apply_reader_pragmas(&conn, self.busy_timeout_ms)?;
                conn
            }
        };

        let result = f(&conn);

        if !self.closed.load(Ordering::Acquire) {
            let mut pool = self
                .readers
                .lock()
                .map_err(|_| crate::to_storage_err("reader pool mutex poisoned".into()))?;
            if pool.len() < self.pool_size {
                pool.push(conn);
            }
            // Overflow connections drop here and close.
        }

        result
    }

    /// Idempotent close: drops the writer and all pooled readers.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut pool) = self.readers.lock() {
            pool.clear();
        }
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(conn) = guard.take() {
                // Best-effort WAL checkpoint so the sidecars shrink.
                let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
            }
        }
        debug!("accessor closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Accessor {
    fn drop(&mut self) {
        self.close();
    }
}
