//! Read-only counters feeding diagnostics.

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

#[derive(Debug, Clone, Default)]
pub struct StorageCounters {
    pub total_memories: u64,
    pub active_memories: u64,
    pub tombstones: u64,
}

pub fn storage_counters(conn: &Connection) -> Result<StorageCounters, StorageError> {
    let total: u64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    let active: u64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE is_deleted = 0",
        [],
        |r| r.get(0),
    )?;
    Ok(StorageCounters {
        total_memories: total,
        active_memories: active,
        tombstones: total - active,
    })
}

impl StorageCounters {
    pub fn tombstone_ratio(&self) -> f64 {
        if self.total_memories == 0 {
            0.0
        } else {
            self.tombstones as f64 / self.total_memories as f64
        }
    }
}
