//! Queue rows: enqueue-if-absent, FIFO lease, completion, retry/dead,
//! stale-lease reaping.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{Job, JobStatus, JobType};

use crate::now_rfc3339;
use crate::queries::memory_crud::parse_rfc3339;

const JOB_COLUMNS: &str = "id, memory_id, document_id, job_type, status, attempts,
    max_attempts, leased_at, created_at, updated_at, error, result";

/// Insert a pending job unless a pending/leased job already exists for
/// the same key + type. Returns true when a row was inserted.
pub fn enqueue(conn: &Connection, job: &Job) -> Result<bool, StorageError> {
    // The partial unique index on (key, job_type) enforces exclusivity;
    // OR IGNORE turns the conflict into a no-op.
    let rows = conn.execute(
        "INSERT OR IGNORE INTO memory_jobs (
            id, memory_id, document_id, job_type, status, attempts,
            max_attempts, leased_at, created_at, updated_at, error, result
        ) VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, NULL, ?6, ?6, NULL, NULL)",
        params![
            job.id,
            job.memory_id,
            job.document_id,
            job.job_type.as_str(),
            job.max_attempts,
            now_rfc3339(),
        ],
    )?;
    Ok(rows > 0)
}

/// Lease the oldest pending job of this type with attempts remaining.
/// Sets `leased_at` and increments `attempts`. Call inside a write tx.
pub fn lease(
    conn: &Connection,
    job_type: JobType,
    max_attempts: u32,
) -> Result<Option<Job>, StorageError> {
    let candidate: Option<String> = conn
        .query_row(
            "SELECT id FROM memory_jobs
             WHERE job_type = ?1 AND status = 'pending' AND attempts < ?2
             ORDER BY created_at ASC LIMIT 1",
            params![job_type.as_str(), max_attempts],
            |row| row.get(0),
        )
        .optional()?;

    let Some(id) = candidate else { return Ok(None) };

    conn.execute(
        "UPDATE memory_jobs
         SET status = 'leased', leased_at = ?2, attempts = attempts + 1, updated_at = ?2
         WHERE id = ?1",
        params![id, now_rfc3339()],
    )?;

    get_job(conn, &id)
}

pub fn get_job(conn: &Connection, id: &str) -> Result<Option<Job>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM memory_jobs WHERE id = ?1"
    ))?;
    let job = stmt.query_row(params![id], row_to_job).optional()?;
    Ok(job)
}

pub fn complete(
    conn: &Connection,
    id: &str,
    result: Option<&serde_json::Value>,
) -> Result<(), StorageError> {
    let result_json = result
        .map(|v| serde_json::to_string(v))
        .transpose()
        .map_err(|e| crate::to_storage_err(e.to_string()))?;
    conn.execute(
        "UPDATE memory_jobs
         SET status = 'completed', result = ?2, error = NULL, updated_at = ?3
         WHERE id = ?1",
        params![id, result_json, now_rfc3339()],
    )?;
    Ok(())
}

/// Failed attempt: back to pending while attempts remain, else dead.
pub fn fail(
    conn: &Connection,
    id: &str,
    error: &str,
    max_attempts: u32,
) -> Result<JobStatus, StorageError> {
    let attempts: u32 = conn.query_row(
        "SELECT attempts FROM memory_jobs WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;

    let next = if attempts < max_attempts {
        JobStatus::Pending
    } else {
        JobStatus::Dead
    };
    conn.execute(
        "UPDATE memory_jobs
         SET status = ?2, error = ?3, leased_at = NULL, updated_at = ?4
         WHERE id = ?1",
        params![id, next.as_str(), error, now_rfc3339()],
    )?;
    Ok(next)
}

/// Return leased rows whose lease is older than `timeout` to pending.
pub fn reap_stale_leases(conn: &Connection, timeout: Duration) -> Result<usize, StorageError> {
    let cutoff = (Utc::now() - timeout).to_rfc3339();
    let rows = conn.execute(
        "UPDATE memory_jobs
         SET status = 'pending', leased_at = NULL, updated_at = ?2
         WHERE status = 'leased' AND leased_at < ?1",
        params![cutoff, now_rfc3339()],
    )?;
    Ok(rows)
}

/// Requeue up to `limit` dead jobs (oldest first), resetting attempts.
pub fn requeue_dead(conn: &Connection, limit: usize) -> Result<usize, StorageError> {
    let rows = conn.execute(
        "UPDATE memory_jobs
         SET status = 'pending', attempts = 0, error = NULL, leased_at = NULL, updated_at = ?2
         WHERE id IN (
            SELECT id FROM memory_jobs WHERE status = 'dead'
            ORDER BY updated_at ASC LIMIT ?1
         )",
        params![limit as i64, now_rfc3339()],
    )?;
    Ok(rows)
}

/// Queue health counters for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct QueueCounters {
    pub pending: u64,
    pub leased: u64,
    pub dead: u64,
    pub oldest_pending_age_secs: Option<i64>,
    pub dead_last_24h: u64,
    pub finished_last_24h: u64,
    pub stale_leases: u64,
}

pub fn queue_counters(
    conn: &Connection,
    stale_after: Duration,
) -> Result<QueueCounters, StorageError> {
    let mut counters = QueueCounters::default();

    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM memory_jobs GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        match status.as_str() {
            "pending" => counters.pending = count,
            "leased" => counters.leased = count,
            "dead" => counters.dead = count,
            _ => {}
        }
    }

    let oldest_pending: Option<String> = conn
        .query_row(
            "SELECT MIN(created_at) FROM memory_jobs WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    counters.oldest_pending_age_secs = oldest_pending
        .and_then(|t| parse_rfc3339(&t))
        .map(|t| (Utc::now() - t).num_seconds());

    let day_ago = (Utc::now() - Duration::hours(24)).to_rfc3339();
    counters.dead_last_24h = conn.query_row(
        "SELECT COUNT(*) FROM memory_jobs WHERE status = 'dead' AND updated_at >= ?1",
        params![day_ago],
        |row| row.get(0),
    )?;
    counters.finished_last_24h = conn.query_row(
        "SELECT COUNT(*) FROM memory_jobs
         WHERE status IN ('completed', 'dead') AND updated_at >= ?1",
        params![day_ago],
        |row| row.get(0),
    )?;

    let stale_cutoff = (Utc::now() - stale_after).to_rfc3339();
    counters.stale_leases = conn.query_row(
        "SELECT COUNT(*) FROM memory_jobs WHERE status = 'leased' AND leased_at < ?1",
        params![stale_cutoff],
        |row| row.get(0),
    )?;

    Ok(counters)
}

fn row_to_job(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let job_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    let leased_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    let result: Option<String> = row.get(11)?;

    Ok(Job {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        document_id: row.get(2)?,
        job_type: JobType::parse(&job_type).unwrap_or(JobType::Extract),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        leased_at: leased_at.and_then(|t| parse_rfc3339(&t)),
        created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_rfc3339(&updated_at).unwrap_or_else(Utc::now),
        error: row.get(10)?,
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
    })
}
