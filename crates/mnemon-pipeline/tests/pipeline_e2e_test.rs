//! End-to-end pipeline scenarios with a scripted LLM and a fixed
//! embedder: shadow ADD, controlled-write ADD, dedup, low-confidence
//! skip, and blocked destructive mutations.
//!
//! The orchestrator is process-wide, so these tests serialize on a
//! local lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use mnemon_core::config::MnemonConfig;
use mnemon_core::errors::ProviderError;
use mnemon_core::models::{HistoryEvent, Memory, MemoryType};
use mnemon_core::traits::{EmbeddingProvider, GenerateOptions, LlmProvider};
use mnemon_pipeline::Pipeline;
use mnemon_storage::queries::{history_ops, memory_crud};
use mnemon_storage::StorageEngine;

fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

// ─── Fakes ───────────────────────────────────────────────────────────────

struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        Ok(responses
            .pop_front()
            .unwrap_or_else(|| r#"{"items": [], "relations": []}"#.to_string()))
    }

    async fn available(&self) -> bool {
        true
    }
}

struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed-3d"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, ProviderError> {
        Ok(Some(vec![0.1, 0.2, 0.3]))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────

fn extraction_response(content: &str, item_type: &str, confidence: f64) -> String {
    serde_json::json!({
        "items": [{"content": content, "type": item_type, "confidence": confidence}],
        "relations": [],
    })
    .to_string()
}

fn fast_config() -> MnemonConfig {
    let mut config = MnemonConfig::default();
    config.pipeline.worker_poll_ms = 25;
    config.pipeline.autonomous_enabled = false;
    config
}

async fn wait_for_completed_job(storage: &StorageEngine, memory_id: &str) -> Value {
    for _ in 0..200 {
        let row: Option<(String, Option<String>)> = storage
            .with_read(|conn| {
                use rusqlite::OptionalExtension;
                conn.query_row(
                    "SELECT status, result FROM memory_jobs WHERE memory_id = ?1",
                    [memory_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(Into::into)
            })
            .unwrap();
        if let Some((status, result)) = row {
            assert_ne!(status, "dead", "job died");
            if status == "completed" {
                return result
                    .and_then(|r| serde_json::from_str(&r).ok())
                    .unwrap_or(Value::Null);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job for {memory_id} never completed");
}

fn count_memories(storage: &StorageEngine) -> i64 {
    storage
        .with_read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
                .map_err(Into::into)
        })
        .unwrap()
}

// ─── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn shadow_mode_add_records_proposal_without_mutating() {
    let _guard = test_lock().lock().unwrap_or_else(|e| e.into_inner());
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let llm = ScriptedLlm::new(vec![&extraction_response(
        "User prefers dark mode in their editor settings",
        "preference",
        0.95,
    )]);
    let mut config = fast_config();
    config.pipeline.shadow_mode = true;

    let pipeline = Pipeline::start_with_storage(
        Arc::clone(&storage),
        config,
        llm,
        Some(Arc::new(FixedEmbedder)),
    )
    .unwrap();

    let source_id = pipeline
        .remember(
            "Raw note: user mentioned preferring dark mode in editor settings.",
            MemoryType::Fact,
        )
        .unwrap();
    let report = wait_for_completed_job(&storage, &source_id).await;

    assert_eq!(report["writeMode"], "shadow");
    // Only the source memory exists; the proposal was not applied.
    assert_eq!(count_memories(&storage), 1);

    let shadow_rows: Vec<_> = storage
        .with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT changed_by, metadata_json FROM memory_history WHERE event = 'none'",
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap();
    assert_eq!(shadow_rows.len(), 1);
    assert_eq!(shadow_rows[0].0, "pipeline-shadow");
    let metadata: Value = serde_json::from_str(&shadow_rows[0].1).unwrap();
    assert_eq!(metadata["shadow"], true);
    assert_eq!(metadata["proposedAction"], "add");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn controlled_write_add_with_embedding() {
    let _guard = test_lock().lock().unwrap_or_else(|e| e.into_inner());
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let llm = ScriptedLlm::new(vec![&extraction_response(
        "User prefers dark mode in their editor settings",
        "preference",
        0.95,
    )]);
    let mut config = fast_config();
    config.pipeline.shadow_mode = false;

    let pipeline = Pipeline::start_with_storage(
        Arc::clone(&storage),
        config,
        llm,
        Some(Arc::new(FixedEmbedder)),
    )
    .unwrap();

    let source_id = pipeline
        .remember("Raw note about the user's editor theme preference.", MemoryType::Fact)
        .unwrap();
    let report = wait_for_completed_job(&storage, &source_id).await;

    assert_eq!(report["writeStats"]["added"], 1);
    assert_eq!(report["writeStats"]["embeddingsAdded"], 1);
    assert_eq!(count_memories(&storage), 2);

    let extracted = storage
        .with_read(|conn| {
            memory_crud::get_live_by_hash(
                conn,
                &mnemon_core::models::compute_content_hash(
                    &mnemon_core::models::normalize_content(
                        "User prefers dark mode in their editor settings",
                    ),
                ),
            )
        })
        .unwrap()
        .expect("extracted memory must exist");
    assert_eq!(extracted.memory_type, MemoryType::Preference);

    let history = storage
        .with_read(|conn| history_ops::for_memory(conn, &extracted.id))
        .unwrap();
    assert!(history.iter().any(|h| h.event == HistoryEvent::Created));

    let dims: i64 = storage
        .with_read(|conn| {
            conn.query_row(
                "SELECT dimensions FROM embeddings WHERE content_hash = ?1",
                [extracted.content_hash.as_str()],
                |r| r.get(0),
            )
            .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(dims, 3);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn second_ingest_of_same_fact_dedupes() {
    let _guard = test_lock().lock().unwrap_or_else(|e| e.into_inner());
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let fact = "The staging database runs PostgreSQL 16";
    let llm = ScriptedLlm::new(vec![
        &extraction_response(fact, "fact", 0.9),
        &extraction_response(fact, "fact", 0.9),
    ]);
    let mut config = fast_config();
    config.pipeline.shadow_mode = false;

    let pipeline = Pipeline::start_with_storage(
        Arc::clone(&storage),
        config,
        llm,
        Some(Arc::new(FixedEmbedder)),
    )
    .unwrap();

    let first_source = pipeline
        .remember("Noted during standup: staging db is postgres 16.", MemoryType::Fact)
        .unwrap();
    let first = wait_for_completed_job(&storage, &first_source).await;
    assert_eq!(first["writeStats"]["added"], 1);

    let second_source = pipeline
        .remember("Second mention of the staging database version.", MemoryType::Fact)
        .unwrap();
    let second = wait_for_completed_job(&storage, &second_source).await;
    assert_eq!(second["writeStats"]["added"], 0);
    assert_eq!(second["writeStats"]["deduped"], 1);

    let deduped_history: i64 = storage
        .with_read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM memory_history WHERE metadata_json LIKE '%dedupedExistingId%'",
                [],
                |r| r.get(0),
            )
            .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(deduped_history, 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn low_confidence_fact_is_skipped() {
    let _guard = test_lock().lock().unwrap_or_else(|e| e.into_inner());
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let llm = ScriptedLlm::new(vec![&extraction_response(
        "Maybe the user likes tabs over spaces",
        "preference",
        0.2,
    )]);
    let mut config = fast_config();
    config.pipeline.shadow_mode = false;
    config.pipeline.min_fact_confidence_for_write = 0.9;

    let pipeline = Pipeline::start_with_storage(
        Arc::clone(&storage),
        config,
        llm,
        Some(Arc::new(FixedEmbedder)),
    )
    .unwrap();

    let source_id = pipeline
        .remember("A hedged remark about indentation.", MemoryType::Fact)
        .unwrap();
    let report = wait_for_completed_job(&storage, &source_id).await;

    assert_eq!(report["writeStats"]["skippedLowConfidence"], 1);
    assert_eq!(report["writeStats"]["added"], 0);
    assert_eq!(count_memories(&storage), 1, "no memory written");

    let skipped: i64 = storage
        .with_read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM memory_history WHERE metadata_json LIKE '%low_fact_confidence%'",
                [],
                |r| r.get(0),
            )
            .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(skipped, 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn contradiction_delete_blocked_when_destructive_disabled() {
    let _guard = test_lock().lock().unwrap_or_else(|e| e.into_inner());
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());

    // Pre-existing memory the new fact contradicts.
    let existing = Memory::new("User does not prefer dark mode editor", MemoryType::Preference);
    let existing_id = existing.id.clone();
    storage
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &existing))
        .unwrap();

    let llm = ScriptedLlm::new(vec![&extraction_response(
        "User prefers dark mode editor",
        "preference",
        0.95,
    )]);
    let mut config = fast_config();
    config.pipeline.shadow_mode = false;
    config.pipeline.allow_update_delete = false;

    let pipeline = Pipeline::start_with_storage(
        Arc::clone(&storage),
        config,
        llm,
        Some(Arc::new(FixedEmbedder)),
    )
    .unwrap();

    let source_id = pipeline
        .remember("User said they now like dark editors.", MemoryType::Fact)
        .unwrap();
    let report = wait_for_completed_job(&storage, &source_id).await;

    assert_eq!(report["writeStats"]["blockedDestructive"], 1);
    assert_eq!(report["writeStats"]["reviewNeeded"], 1);

    let target = storage
        .with_read(|conn| memory_crud::get_memory(conn, &existing_id))
        .unwrap()
        .unwrap();
    assert!(!target.is_deleted, "blocked delete must not tombstone");

    let blocked = storage
        .with_read(|conn| history_ops::for_memory(conn, &existing_id))
        .unwrap();
    let has_block = blocked.iter().any(|h| {
        h.metadata["blockedReason"] == "destructive_mutations_disabled"
            && h.metadata["reviewNeeded"] == true
    });
    assert!(has_block, "history: {blocked:?}");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn double_start_is_a_lifecycle_error() {
    let _guard = test_lock().lock().unwrap_or_else(|e| e.into_inner());
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let pipeline = Pipeline::start_with_storage(
        Arc::clone(&storage),
        fast_config(),
        ScriptedLlm::new(vec![]),
        None,
    )
    .unwrap();

    let second = Pipeline::start_with_storage(
        Arc::clone(&storage),
        fast_config(),
        ScriptedLlm::new(vec![]),
        None,
    );
    assert!(second.is_err(), "re-init without close must fail");

    pipeline.shutdown().await;

    // After a clean shutdown a new pipeline may start.
    let third = Pipeline::start_with_storage(
        Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap()),
        fast_config(),
        ScriptedLlm::new(vec![]),
        None,
    )
    .unwrap();
    third.shutdown().await;
}
