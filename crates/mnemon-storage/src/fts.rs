//! FTS5 upkeep: schema creation, startup self-heal, drift measurement,
//! and BM25 search.
//!
//! The mirror is an external-content FTS5 table over `memories.content`.
//! Triggers keep it aligned with row inserts, content updates, and hard
//! deletes. Soft deletes intentionally leave their FTS rows behind; the
//! growing gap between FTS rows and live memories is the tombstone-drift
//! signal diagnostics watches, and a rebuild (or the retention sweep's
//! hard deletes) closes it.

use rusqlite::Connection;
use tracing::{info, warn};

use mnemon_core::errors::StorageError;

/// Create the FTS table and its sync triggers. Idempotent.
pub fn create_fts_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            content,
            content='memories',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS memories_fts_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_fts_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content)
                VALUES ('delete', old.rowid, old.content);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_fts_au AFTER UPDATE OF content ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content)
                VALUES ('delete', old.rowid, old.content);
            INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
        END;",
    )?;
    Ok(())
}

/// True if the FTS table exists.
pub fn fts_exists(conn: &Connection) -> Result<bool, StorageError> {
    let exists = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='memories_fts'")
        .and_then(|mut stmt| stmt.exists([]))?;
    Ok(exists)
}

/// Startup self-heal: recreate the table + triggers and backfill if the
/// virtual table is missing.
pub fn self_heal(conn: &Connection) -> Result<bool, StorageError> {
    if fts_exists(conn)? {
        return Ok(false);
    }
    warn!("memories_fts missing, recreating and backfilling");
    create_fts_schema(conn)?;
    backfill(conn)?;
    Ok(true)
}

/// Drop all FTS rows and reindex every non-deleted memory.
pub fn rebuild(conn: &Connection) -> Result<usize, StorageError> {
    conn.execute_batch(
        "DROP TRIGGER IF EXISTS memories_fts_ai;
         DROP TRIGGER IF EXISTS memories_fts_ad;
         DROP TRIGGER IF EXISTS memories_fts_au;
         DROP TABLE IF EXISTS memories_fts;",
    )?;
    create_fts_schema(conn)?;
    let rows = backfill(conn)?;
    info!("rebuilt memories_fts with {rows} rows");
    Ok(rows)
}

fn backfill(conn: &Connection) -> Result<usize, StorageError> {
    let rows = conn.execute(
        "INSERT INTO memories_fts(rowid, content)
         SELECT rowid, content FROM memories WHERE is_deleted = 0",
        [],
    )?;
    Ok(rows)
}

/// `(fts_rows, active_memories)` for the parity check.
pub fn parity_counts(conn: &Connection) -> Result<(u64, u64), StorageError> {
    let fts_rows: u64 =
        conn.query_row("SELECT COUNT(*) FROM memories_fts", [], |r| r.get(0))?;
    let active: u64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE is_deleted = 0",
        [],
        |r| r.get(0),
    )?;
    Ok((fts_rows, active))
}

/// A lexical hit: memory id plus a 0..1 score derived from BM25.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub memory_id: String,
    pub score: f64,
}

/// BM25 search over non-deleted memories. The raw query is reduced to
/// quoted bareword tokens so FTS operator syntax cannot leak in.
pub fn search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<FtsHit>, StorageError> {
    let Some(match_expr) = sanitize_match_query(query) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT m.id, bm25(memories_fts) AS rank
         FROM memories_fts f
         JOIN memories m ON m.rowid = f.rowid
         WHERE memories_fts MATCH ?1 AND m.is_deleted = 0
         ORDER BY rank
         LIMIT ?2",
    )?;

    let hits = stmt
        .query_map(rusqlite::params![match_expr, limit as i64], |row| {
            let id: String = row.get(0)?;
            let rank: f64 = row.get(1)?;
            Ok((id, rank))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hits
        .into_iter()
        .map(|(memory_id, rank)| FtsHit {
            memory_id,
            score: bm25_to_score(rank),
        })
        .collect())
}

/// FTS5's bm25() returns lower-is-better values (negative for good
/// matches). Map monotonically into (0, 1], higher-is-better.
fn bm25_to_score(rank: f64) -> f64 {
    let goodness = (-rank).max(0.0);
    goodness / (1.0 + goodness)
}

/// Quote each alphanumeric token; OR them together. Returns `None` when
/// no searchable token remains.
fn sanitize_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_operators() {
        assert_eq!(
            sanitize_match_query("dark-mode AND (editor)").unwrap(),
            "\"dark\" OR \"mode\" OR \"AND\" OR \"editor\""
        );
        assert!(sanitize_match_query("  ***  ").is_none());
    }

    #[test]
    fn test_bm25_score_ordering() {
        // More negative bm25 = better match = higher score.
        assert!(bm25_to_score(-5.0) > bm25_to_score(-1.0));
        assert!(bm25_to_score(-1.0) > bm25_to_score(0.0));
        assert!(bm25_to_score(-1000.0) <= 1.0);
    }
}
