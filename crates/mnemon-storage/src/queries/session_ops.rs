//! Session injection rows and post-hoc continuity scores.

use chrono::Utc;
use rusqlite::{params, Connection};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{SessionMemory, SessionScore};

pub fn record_injection(conn: &Connection, row: &SessionMemory) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO session_memories (session_key, memory_id, rank, relevance)
         VALUES (?1, ?2, ?3, ?4)",
        params![row.session_key, row.memory_id, row.rank, row.relevance],
    )?;
    Ok(())
}

/// Write the continuity relevance for one injected memory.
pub fn set_relevance(
    conn: &Connection,
    session_key: &str,
    memory_id: &str,
    relevance: f64,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE session_memories SET relevance = ?3
         WHERE session_key = ?1 AND memory_id = ?2",
        params![session_key, memory_id, relevance],
    )?;
    Ok(())
}

pub fn injected_for_session(
    conn: &Connection,
    session_key: &str,
) -> Result<Vec<SessionMemory>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT session_key, memory_id, rank, relevance FROM session_memories
         WHERE session_key = ?1 ORDER BY rank",
    )?;
    let rows = stmt.query_map(params![session_key], |row| {
        Ok(SessionMemory {
            session_key: row.get(0)?,
            memory_id: row.get(1)?,
            rank: row.get(2)?,
            relevance: row.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn record_score(conn: &Connection, score: &SessionScore) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO session_scores (session_key, score, rationale, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            score.session_key,
            score.score,
            score.rationale,
            score.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn latest_score(
    conn: &Connection,
    session_key: &str,
) -> Result<Option<SessionScore>, StorageError> {
    use rusqlite::OptionalExtension;
    let score = conn
        .query_row(
            "SELECT session_key, score, rationale, created_at FROM session_scores
             WHERE session_key = ?1 ORDER BY created_at DESC LIMIT 1",
            params![session_key],
            |row| {
                let created_at: String = row.get(3)?;
                Ok(SessionScore {
                    session_key: row.get(0)?,
                    score: row.get(1)?,
                    rationale: row.get(2)?,
                    created_at: crate::queries::memory_crud::parse_rfc3339(&created_at)
                        .unwrap_or_else(Utc::now),
                })
            },
        )
        .optional()?;
    Ok(score)
}
