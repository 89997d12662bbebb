//! # mnemon-storage
//!
//! SQLite persistence layer for the Mnemon memory engine.
//! Single write connection + read pool (WAL mode), forward-only
//! migrations, FTS5 content mirror with trigger sync, vec0 vector index,
//! and pre-migration file backups.

pub mod accessor;
pub mod backup;
pub mod engine;
pub mod fts;
pub mod migrations;
pub mod queries;
pub mod vector;

pub use accessor::Accessor;
pub use engine::StorageEngine;

use mnemon_core::errors::StorageError;

/// Helper to convert a string message into a `StorageError::Sqlite`.
pub fn to_storage_err(msg: String) -> StorageError {
    StorageError::Sqlite { message: msg }
}

/// Current UTC timestamp in the RFC3339 form stored everywhere.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
