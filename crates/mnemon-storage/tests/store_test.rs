//! Store invariants: dedup uniqueness, FTS trigger sync, job queue
//! exclusivity and lifecycle, history append-only behavior, embedding
//! pairing, and keyset pagination.

use chrono::{Duration, Utc};

use mnemon_core::models::{HistoryEvent, HistoryRecord, Job, JobStatus, JobType, Memory, MemoryType};
use mnemon_storage::queries::{embedding_ops, history_ops, job_ops, memory_crud};
use mnemon_storage::{fts, StorageEngine};

fn engine() -> StorageEngine {
    StorageEngine::open_in_memory_with_dimensions(3).unwrap()
}

fn memory(content: &str) -> Memory {
    Memory::new(content, MemoryType::Fact)
}

// ── Dedup ────────────────────────────────────────────────────────────────

#[test]
fn dedup_unique_index_rejects_second_live_row() {
    let engine = engine();
    engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &memory("User prefers dark mode")))
        .unwrap();

    // Same normalized content, different casing/punctuation.
    let result = engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &memory("user PREFERS dark mode!")));
    assert!(result.is_err(), "second live row with same hash must fail");
}

#[test]
fn tombstone_frees_the_hash_for_reinsert() {
    let engine = engine();
    let m = memory("ephemeral fact");
    engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &m))
        .unwrap();
    engine
        .with_write_tx(|conn| memory_crud::soft_delete(conn, &m.id, "test"))
        .unwrap();

    // The tombstone keeps the hash but no longer blocks a live row.
    engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &memory("ephemeral fact")))
        .unwrap();

    let tombstone = engine
        .with_read(|conn| memory_crud::get_memory(conn, &m.id))
        .unwrap()
        .unwrap();
    assert!(tombstone.is_deleted);
    assert!(tombstone.deleted_at.is_some(), "is_deleted implies deleted_at");
}

#[test]
fn recover_restores_tombstone() {
    let engine = engine();
    let m = memory("to be recovered");
    engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &m))
        .unwrap();
    engine
        .with_write_tx(|conn| memory_crud::soft_delete(conn, &m.id, "test"))
        .unwrap();
    engine
        .with_write_tx(|conn| memory_crud::recover(conn, &m.id, "test"))
        .unwrap();

    let restored = engine
        .with_read(|conn| memory_crud::get_memory(conn, &m.id))
        .unwrap()
        .unwrap();
    assert!(!restored.is_deleted);
    assert!(restored.deleted_at.is_none());
}

// ── FTS triggers ─────────────────────────────────────────────────────────

#[test]
fn fts_insert_and_search() {
    let engine = engine();
    engine
        .with_write_tx(|conn| {
            memory_crud::insert_memory(conn, &memory("quantum computing breakthrough"))
        })
        .unwrap();

    let hits = engine
        .with_read(|conn| fts::search(conn, "quantum", 10))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score > 0.0);
}

#[test]
fn fts_update_trigger_resyncs_content() {
    let engine = engine();
    let m = memory("original topic nothing special");
    engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &m))
        .unwrap();

    let mut updated = m.clone();
    updated.set_content("now about quantum entanglement");
    engine
        .with_write_tx(|conn| {
            memory_crud::update_content(
                conn,
                &m.id,
                &updated.content,
                &updated.normalized_content,
                &updated.content_hash,
                "test",
            )
        })
        .unwrap();

    let hits = engine
        .with_read(|conn| fts::search(conn, "quantum", 10))
        .unwrap();
    assert_eq!(hits.len(), 1);
    let stale = engine
        .with_read(|conn| fts::search(conn, "original", 10))
        .unwrap();
    assert!(stale.is_empty(), "old content must leave the index");
}

#[test]
fn fts_excludes_soft_deleted() {
    let engine = engine();
    let m = memory("quantum erasure test");
    engine
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &m))
        .unwrap();
    engine
        .with_write_tx(|conn| memory_crud::soft_delete(conn, &m.id, "test"))
        .unwrap();

    let hits = engine
        .with_read(|conn| fts::search(conn, "quantum", 10))
        .unwrap();
    assert!(hits.is_empty());

    // The FTS row itself survives: that gap is the tombstone-drift
    // signal.
    let (fts_rows, active) = engine.with_read(fts::parity_counts).unwrap();
    assert_eq!(fts_rows, 1);
    assert_eq!(active, 0);
}

#[test]
fn fts_rebuild_closes_drift() {
    let engine = engine();
    for i in 0..5 {
        let m = memory(&format!("drifting memory number {i}"));
        engine
            .with_write_tx(|conn| memory_crud::insert_memory(conn, &m))
            .unwrap();
        if i < 4 {
            engine
                .with_write_tx(|conn| memory_crud::soft_delete(conn, &m.id, "test"))
                .unwrap();
        }
    }
    let (fts_rows, active) = engine.with_read(fts::parity_counts).unwrap();
    assert_eq!((fts_rows, active), (5, 1));

    engine.with_write_tx(|conn| fts::rebuild(conn)).unwrap();
    let (fts_rows, active) = engine.with_read(fts::parity_counts).unwrap();
    assert_eq!((fts_rows, active), (1, 1));
}

// ── Job queue ────────────────────────────────────────────────────────────

#[test]
fn job_exclusivity_one_active_per_key() {
    let engine = engine();
    let a = Job::new(JobType::Extract, Some("mem-1".into()), None);
    let b = Job::new(JobType::Extract, Some("mem-1".into()), None);
    let c = Job::new(JobType::Summary, None, Some("mem-1".into()));

    let first = engine.with_write_tx(|conn| job_ops::enqueue(conn, &a)).unwrap();
    let second = engine.with_write_tx(|conn| job_ops::enqueue(conn, &b)).unwrap();
    let other_type = engine.with_write_tx(|conn| job_ops::enqueue(conn, &c)).unwrap();

    assert!(first);
    assert!(!second, "duplicate pending job must be ignored");
    assert!(other_type, "same key, different type is allowed");
}

#[test]
fn lease_is_fifo_and_increments_attempts() {
    let engine = engine();
    let first = Job::new(JobType::Extract, Some("mem-a".into()), None);
    engine.with_write_tx(|conn| job_ops::enqueue(conn, &first)).unwrap();
    // Force a later created_at for the second job.
    let mut second = Job::new(JobType::Extract, Some("mem-b".into()), None);
    second.created_at = Utc::now() + Duration::seconds(5);
    engine
        .with_write_tx(|conn| {
            job_ops::enqueue(conn, &second)?;
            conn.execute(
                "UPDATE memory_jobs SET created_at = ?2 WHERE id = ?1",
                rusqlite::params![second.id, second.created_at.to_rfc3339()],
            )
            .map_err(|e| mnemon_core::errors::StorageError::Sqlite {
                message: e.to_string(),
            })?;
            Ok(())
        })
        .unwrap();

    let leased = engine
        .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
        .unwrap()
        .unwrap();
    assert_eq!(leased.memory_id.as_deref(), Some("mem-a"), "FIFO order");
    assert_eq!(leased.status, JobStatus::Leased);
    assert_eq!(leased.attempts, 1);
    assert!(leased.leased_at.is_some());
}

#[test]
fn fail_retries_until_dead() {
    let engine = engine();
    let job = Job::new(JobType::Extract, Some("mem-x".into()), None);
    engine.with_write_tx(|conn| job_ops::enqueue(conn, &job)).unwrap();

    for attempt in 1..=3u32 {
        let leased = engine
            .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
            .unwrap()
            .unwrap();
        assert_eq!(leased.attempts, attempt);
        let status = engine
            .with_write_tx(|conn| job_ops::fail(conn, &leased.id, "boom", 3))
            .unwrap();
        if attempt < 3 {
            assert_eq!(status, JobStatus::Pending);
        } else {
            assert_eq!(status, JobStatus::Dead);
        }
    }

    // Dead jobs are never leased.
    let next = engine
        .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
        .unwrap();
    assert!(next.is_none());
}

#[test]
fn stale_leases_return_to_pending() {
    let engine = engine();
    let job = Job::new(JobType::Extract, Some("mem-stale".into()), None);
    engine.with_write_tx(|conn| job_ops::enqueue(conn, &job)).unwrap();
    engine
        .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
        .unwrap()
        .unwrap();

    // Backdate the lease by 20 minutes.
    let stale_at = (Utc::now() - Duration::minutes(20)).to_rfc3339();
    engine
        .with_write_tx(|conn| {
            conn.execute(
                "UPDATE memory_jobs SET leased_at = ?1 WHERE memory_id = 'mem-stale'",
                [&stale_at],
            )
            .map_err(|e| mnemon_core::errors::StorageError::Sqlite {
                message: e.to_string(),
            })?;
            Ok(())
        })
        .unwrap();

    let reaped = engine
        .with_write_tx(|conn| job_ops::reap_stale_leases(conn, Duration::minutes(10)))
        .unwrap();
    assert_eq!(reaped, 1);

    let releaseable = engine
        .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
        .unwrap();
    assert!(releaseable.is_some(), "reaped job must be leasable again");
}

#[test]
fn requeue_dead_resets_attempts() {
    let engine = engine();
    let job = Job::new(JobType::Extract, Some("mem-dead".into()), None);
    engine.with_write_tx(|conn| job_ops::enqueue(conn, &job)).unwrap();
    for _ in 0..3 {
        let leased = engine
            .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
            .unwrap()
            .unwrap();
        engine
            .with_write_tx(|conn| job_ops::fail(conn, &leased.id, "boom", 3))
            .unwrap();
    }

    let requeued = engine
        .with_write_tx(|conn| job_ops::requeue_dead(conn, 10))
        .unwrap();
    assert_eq!(requeued, 1);
    let leased = engine
        .with_write_tx(|conn| job_ops::lease(conn, JobType::Extract, 3))
        .unwrap()
        .unwrap();
    assert_eq!(leased.attempts, 1, "attempts reset on requeue");
}

// ── History ──────────────────────────────────────────────────────────────

#[test]
fn history_rows_accumulate_in_order() {
    let engine = engine();
    let m = memory("audited memory");
    engine
        .with_write_tx(|conn| {
            memory_crud::insert_memory(conn, &m)?;
            history_ops::append(
                conn,
                &HistoryRecord::new(&m.id, HistoryEvent::Created, "test"),
            )?;
            history_ops::append(
                conn,
                &HistoryRecord::new(&m.id, HistoryEvent::Updated, "test"),
            )
        })
        .unwrap();

    let rows = engine
        .with_read(|conn| history_ops::for_memory(conn, &m.id))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].event, HistoryEvent::Created);
    assert_eq!(rows[1].event, HistoryEvent::Updated);
}

// ── Embeddings ───────────────────────────────────────────────────────────

#[test]
fn embedding_upsert_keeps_one_row_per_hash() {
    let engine = engine();
    let vector_enabled = engine.vector_enabled();

    let first = engine
        .with_write_tx(|conn| {
            embedding_ops::upsert_embedding(conn, "hash-1", &[0.1, 0.2, 0.3], None, None, vector_enabled)
        })
        .unwrap();
    let second = engine
        .with_write_tx(|conn| {
            embedding_ops::upsert_embedding(conn, "hash-1", &[0.4, 0.5, 0.6], None, None, vector_enabled)
        })
        .unwrap();
    assert_eq!(first, second, "UPSERT must keep the rowid stable");

    let stored = engine
        .with_read(|conn| embedding_ops::get_vector(conn, "hash-1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored, vec![0.4, 0.5, 0.6]);
}

// ── Pagination ───────────────────────────────────────────────────────────

#[test]
fn keyset_pagination_is_stable_and_complete() {
    let engine = engine();
    for i in 0..7 {
        let mut m = memory(&format!("page fixture {i}"));
        m.created_at = Utc::now() + Duration::seconds(i);
        m.updated_at = m.created_at;
        engine
            .with_write_tx(|conn| memory_crud::insert_memory(conn, &m))
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor: Option<(String, String)> = None;
    loop {
        let page = engine
            .with_read(|conn| {
                let after = cursor
                    .as_ref()
                    .map(|(c, i)| (c.as_str(), i.as_str()));
                memory_crud::list_page(conn, after, 3)
            })
            .unwrap();
        if page.is_empty() {
            break;
        }
        let last = &page[page.len() - 1];
        cursor = Some((last.created_at.to_rfc3339(), last.id.clone()));
        seen.extend(page.into_iter().map(|m| m.id));
    }
    assert_eq!(seen.len(), 7);
    let unique: std::collections::HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), 7, "no duplicates across pages");
}

// ── Startup backup ───────────────────────────────────────────────────────

#[test]
fn pending_migration_triggers_backup_of_existing_db() {
    let dir = tempfile::tempdir().unwrap();
    let config = mnemon_core::config::StorageConfig {
        data_dir: dir.path().to_path_buf(),
        ..mnemon_core::config::StorageConfig::default()
    };

    // First open: fresh database, fully migrated, no backup.
    let engine = StorageEngine::open(&config).unwrap();
    engine.close();

    // Rewind the schema one version so the next open has work to do.
    {
        let conn = rusqlite::Connection::open(config.db_path()).unwrap();
        conn.execute_batch(
            "DELETE FROM schema_migrations WHERE version = 6;
             DROP TABLE connectors;
             DROP TABLE ingestion_jobs;",
        )
        .unwrap();
    }

    let engine = StorageEngine::open(&config).unwrap();
    engine.close();

    let backups: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().into_string().unwrap())
        .filter(|n| n.contains(".bak-v"))
        .collect();
    assert_eq!(backups.len(), 1, "backups: {backups:?}");
    assert!(backups[0].starts_with("memory.db.bak-v5-"), "name: {}", backups[0]);

    // The migration re-applied: connectors is queryable again.
    let engine = StorageEngine::open(&config).unwrap();
    let count: i64 = engine
        .with_read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM connectors", [], |r| r.get(0))
                .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(count, 0);
    engine.close();
}
