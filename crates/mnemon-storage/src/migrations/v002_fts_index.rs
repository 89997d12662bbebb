//! FTS5 content mirror over `memories.content`, synced by triggers.

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

use crate::fts;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    fts::create_fts_schema(conn)
}
