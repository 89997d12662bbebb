//! Pipeline orchestrator: owns the storage engine, builds the recall /
//! decision / sink graph from config, starts the workers, and tears
//! everything down cooperatively.
//!
//! The accessor behind the engine is process-wide: starting a second
//! pipeline before shutting the first one down is a programming error,
//! surfaced as `EngineError::Lifecycle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use mnemon_core::config::MnemonConfig;
use mnemon_core::errors::{EngineError, EngineResult};
use mnemon_core::models::{Document, Memory, MemoryType};
use mnemon_core::traits::{EmbeddingProvider, LlmProvider};
use mnemon_observability::{Diagnostics, HealthReport, ProviderTracker, SharedProviderTracker};
use mnemon_retrieval::{RankedMemory, RecallEngine};
use mnemon_storage::queries::{document_ops, memory_crud};
use mnemon_storage::StorageEngine;

use crate::decision::{ApplyMutations, DecisionEngine, MutationSink, RecordShadowOnly};
use crate::queue::JobQueue;
use crate::repair::RepairRunner;
use crate::workers::{
    DocumentIngestWorker, ExtractionWorker, MaintenanceWorker, RetentionWorker, SummaryWorker,
    WorkerHandle,
};

/// Items the extractor keeps regardless of the write gate; the decision
/// engine applies the real confidence floor.
const EXTRACTION_PARSE_FLOOR: f64 = 0.1;

static PIPELINE_ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct Pipeline {
    storage: Arc<StorageEngine>,
    queue: JobQueue,
    recall: Arc<RecallEngine>,
    diagnostics: Arc<Diagnostics>,
    tracker: SharedProviderTracker,
    config: MnemonConfig,
    workers: Vec<WorkerHandle>,
}

impl Pipeline {
    /// Open the store at the configured data dir and start the engine.
    pub fn start(
        config: MnemonConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> EngineResult<Self> {
        let storage = Arc::new(StorageEngine::open(&config.storage)?);
        Self::start_with_storage(storage, config, llm, embedder)
    }

    /// Start against an already-open engine (tests use the in-memory
    /// variant). Fails if another pipeline is active in this process.
    pub fn start_with_storage(
        storage: Arc<StorageEngine>,
        config: MnemonConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> EngineResult<Self> {
        if PIPELINE_ACTIVE.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Lifecycle(
                "pipeline already initialized; shut the previous instance down first".to_string(),
            ));
        }

        let tracker = ProviderTracker::shared(100);
        let queue = JobQueue::new(Arc::clone(&storage));
        let recall = Arc::new(RecallEngine::new(
            Arc::clone(&storage),
            embedder.clone(),
            config.recall.clone(),
        ));
        let diagnostics = Arc::new(Diagnostics::new(
            Arc::clone(&storage),
            Arc::clone(&tracker),
        ));

        let engine = Arc::new(DecisionEngine::new(
            Arc::clone(&storage),
            Arc::clone(&recall),
            Some(Arc::clone(&llm)),
            config.pipeline.clone(),
        ));

        let sink: Arc<dyn MutationSink> =
            if config.pipeline.shadow_mode || config.pipeline.mutations_frozen {
                Arc::new(RecordShadowOnly::new(Arc::clone(&storage)))
            } else {
                Arc::new(ApplyMutations::new(
                    Arc::clone(&storage),
                    embedder.clone(),
                    config.pipeline.allow_update_delete,
                ))
            };

        let timeout = Duration::from_millis(config.llm.timeout_ms);

        let mut workers = Vec::new();
        if config.pipeline.enabled {
            let poll = Duration::from_millis(config.pipeline.worker_poll_ms);
            let retries = config.pipeline.worker_max_retries;

            workers.push(ExtractionWorker::start(
                Arc::clone(&storage),
                queue.clone(),
                Arc::clone(&llm),
                EXTRACTION_PARSE_FLOOR,
                timeout,
                config.llm.max_tokens,
                Arc::clone(&engine),
                Arc::clone(&sink),
                Arc::clone(&tracker),
                poll,
                retries,
            ));
            workers.push(DocumentIngestWorker::start(
                Arc::clone(&storage),
                queue.clone(),
                embedder.clone(),
                config.chunker,
                poll,
                retries,
            ));
            workers.push(SummaryWorker::start(
                Arc::clone(&storage),
                queue.clone(),
                Arc::clone(&llm),
                Arc::clone(&engine),
                Arc::clone(&sink),
                config.storage.summaries_dir(),
                poll,
                retries,
            ));

            if config.pipeline.autonomous_enabled {
                workers.push(RetentionWorker::start(
                    Arc::clone(&storage),
                    config.retention,
                ));
                let runner = RepairRunner::new(
                    Arc::clone(&storage),
                    config.maintenance.clone(),
                    config.retention,
                    Duration::from_millis(config.pipeline.lease_timeout_ms),
                );
                workers.push(MaintenanceWorker::start(
                    queue.clone(),
                    Arc::clone(&diagnostics),
                    runner,
                    config.maintenance.clone(),
                    Duration::from_millis(config.pipeline.lease_timeout_ms),
                ));
            }
        }

        info!(
            "pipeline started: {} workers, shadow_mode={}, autonomous={}",
            workers.len(),
            config.pipeline.shadow_mode,
            config.pipeline.autonomous_enabled
        );

        Ok(Self {
            storage,
            queue,
            recall,
            diagnostics,
            tracker,
            config,
            workers,
        })
    }

    /// Insert a raw memory and queue its extraction.
    pub fn remember(&self, content: &str, memory_type: MemoryType) -> EngineResult<String> {
        let mut memory = Memory::new(content, memory_type);
        memory.extraction_status = mnemon_core::models::ExtractionStatus::Pending;
        memory.source_type = Some("direct".to_string());
        let id = memory.id.clone();
        self.storage
            .with_write_tx(|conn| memory_crud::insert_memory(conn, &memory))?;
        self.queue
            .enqueue_extract(&id, self.config.pipeline.worker_max_retries)?;
        Ok(id)
    }

    /// Register a document and queue its ingest.
    pub fn ingest_document(
        &self,
        source_type: &str,
        raw_content: &str,
        title: Option<&str>,
    ) -> EngineResult<String> {
        let mut document = Document::new(source_type, raw_content);
        document.title = title.map(str::to_string);
        let id = document.id.clone();
        self.storage
            .with_write_tx(|conn| document_ops::insert_document(conn, &document))?;
        self.queue
            .enqueue_document(&id, self.config.pipeline.worker_max_retries)?;
        Ok(id)
    }

    pub async fn recall(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
    ) -> EngineResult<Vec<RankedMemory>> {
        self.recall.recall(query, top_k, min_score).await
    }

    /// Bring a soft-deleted memory back, with the audit row to match.
    pub fn recover_memory(&self, id: &str, reason: &str) -> EngineResult<()> {
        use mnemon_core::models::{HistoryEvent, HistoryRecord};
        self.storage.with_write_tx(|conn| {
            memory_crud::recover(conn, id, "operator")?;
            mnemon_storage::queries::history_ops::append(
                conn,
                &HistoryRecord::new(id, HistoryEvent::Recovered, "operator").with_reason(reason),
            )
        })?;
        Ok(())
    }

    pub fn health(&self) -> EngineResult<HealthReport> {
        self.diagnostics.run()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn tracker(&self) -> &SharedProviderTracker {
        &self.tracker
    }

    /// Cooperative shutdown: stop every worker (awaiting in-flight
    /// ticks), then close the accessor.
    pub async fn shutdown(mut self) {
        for worker in &mut self.workers {
            worker.stop().await;
        }
        self.storage.close();
        PIPELINE_ACTIVE.store(false, Ordering::Release);
        info!("pipeline shut down");
    }
}
