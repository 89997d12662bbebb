//! Document-ingest worker: drives `documents.status` through
//! queued → extracting → chunking → embedding → indexing → done.
//!
//! Each chunk dedups against memories already derived from the same
//! document, then lands as memory + link + embedding + vec row in one
//! write transaction. Embedding calls happen strictly outside the
//! transaction.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use mnemon_core::config::ChunkerConfig;
use mnemon_core::errors::{EngineResult, ParseError, QueueError};
use mnemon_core::models::{
    Chunk, Document, DocumentMemory, DocumentStatus, HistoryEvent, HistoryRecord, Job, JobType,
    Memory, MemoryType,
};
use mnemon_core::traits::EmbeddingProvider;
use mnemon_ingest::{parser_for, Chunker};
use mnemon_storage::queries::{document_ops, embedding_ops, history_ops, memory_crud};
use mnemon_storage::StorageEngine;

use crate::decision::CHANGED_BY_PIPELINE;
use crate::queue::JobQueue;
use crate::workers::handle::{Tick, WorkerHandle};

pub struct DocumentIngestWorker {
    storage: Arc<StorageEngine>,
    queue: JobQueue,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chunker_config: ChunkerConfig,
    max_retries: u32,
}

impl DocumentIngestWorker {
    pub fn start(
        storage: Arc<StorageEngine>,
        queue: JobQueue,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        chunker_config: ChunkerConfig,
        poll: Duration,
        max_retries: u32,
    ) -> WorkerHandle {
        let worker = Arc::new(Self {
            storage,
            queue,
            embedder,
            chunker_config,
            max_retries,
        });
        WorkerHandle::spawn("document-ingest", poll, move || {
            let worker = Arc::clone(&worker);
            async move { worker.tick().await }
        })
    }

    async fn tick(&self) -> EngineResult<Tick> {
        let Some(job) = self.queue.lease(JobType::DocumentIngest, self.max_retries)? else {
            return Ok(Tick::Idle);
        };

        match self.process(&job).await {
            Ok((chunks, memories)) => {
                self.queue.complete(
                    &job,
                    Some(json!({ "chunks": chunks, "memories": memories })),
                )?;
                Ok(Tick::Worked)
            }
            Err(e) => {
                let status = self.queue.fail(&job, &e.to_string(), self.max_retries)?;
                warn!("document job {} failed ({e}), now {:?}", job.id, status);
                if let Some(document_id) = &job.document_id {
                    let _ = self.storage.with_write_tx(|conn| {
                        document_ops::set_status(conn, document_id, DocumentStatus::Failed)
                    });
                }
                Err(e)
            }
        }
    }

    async fn process(&self, job: &Job) -> EngineResult<(u32, u32)> {
        let document_id = job
            .document_id
            .as_deref()
            .ok_or_else(|| QueueError::MissingKey {
                id: job.id.clone(),
                field: "document_id",
            })?;

        let document = self
            .storage
            .with_read(|conn| document_ops::get_document(conn, document_id))?
            .ok_or_else(|| mnemon_core::errors::StorageError::NotFound {
                table: "documents",
                id: document_id.to_string(),
            })?;

        // extracting: parse the raw content.
        self.set_status(&document.id, DocumentStatus::Extracting)?;
        let parser = parser_for(&document.source_type).ok_or_else(|| {
            ParseError::Malformed {
                format: document.source_type.clone(),
                message: "no parser registered".to_string(),
            }
        })?;
        let parsed = parser.parse(&document.raw_content)?;

        // chunking.
        self.set_status(&document.id, DocumentStatus::Chunking)?;
        let chunks = Chunker::new(self.chunker_config).chunk(&parsed);
        let chunk_count = chunks.len() as u32;

        // Dedup set: content hashes already linked to this document.
        let known: HashSet<String> = self
            .storage
            .with_read(|conn| document_ops::linked_content_hashes(conn, &document.id))?
            .into_iter()
            .collect();

        // embedding: fetch vectors outside any transaction.
        self.set_status(&document.id, DocumentStatus::Embedding)?;
        let mut prepared: Vec<(Chunk, Memory, Option<Vec<f32>>)> = Vec::new();
        for chunk in chunks {
            let memory = self.chunk_memory(&document, &chunk);
            if known.contains(&memory.content_hash) {
                continue;
            }
            let vector = match &self.embedder {
                Some(embedder) => match embedder.embed(&memory.content).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("chunk embedding failed, storing without vector: {e}");
                        None
                    }
                },
                None => None,
            };
            prepared.push((chunk, memory, vector));
        }

        // indexing: one write tx per chunk keeps failures small.
        self.set_status(&document.id, DocumentStatus::Indexing)?;
        let vector_enabled = self.storage.vector_enabled();
        let mut inserted_count = 0u32;
        for (chunk, memory, vector) in prepared {
            // A chunk may duplicate a memory from another document; the
            // live-hash unique index decides inside the transaction.
            let inserted = self.storage.with_write_tx(|conn| {
                if memory_crud::get_live_by_hash(conn, &memory.content_hash)?.is_some() {
                    return Ok(false);
                }
                memory_crud::insert_memory(conn, &memory)?;
                history_ops::append(
                    conn,
                    &HistoryRecord::new(&memory.id, HistoryEvent::Created, CHANGED_BY_PIPELINE)
                        .with_reason("document chunk"),
                )?;
                document_ops::link_memory(
                    conn,
                    &DocumentMemory {
                        document_id: memory
                            .source_id
                            .clone()
                            .unwrap_or_else(|| document_id.to_string()),
                        memory_id: memory.id.clone(),
                        chunk_index: chunk.index,
                    },
                )?;
                if let Some(v) = &vector {
                    embedding_ops::upsert_embedding(
                        conn,
                        &memory.content_hash,
                        v,
                        Some("document"),
                        Some(&memory.id),
                        vector_enabled,
                    )?;
                }
                Ok(true)
            })?;
            if inserted {
                inserted_count += 1;
            }
        }

        // memory_count tracks every memory linked to the document, not
        // just this run's additions; re-ingests must not shrink it.
        let memory_count = self.storage.with_write_tx(|conn| {
            let linked: u32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM document_memories WHERE document_id = ?1",
                    [&document.id],
                    |r| r.get(0),
                )
                .map_err(mnemon_core::errors::StorageError::from)?;
            document_ops::set_counts(conn, &document.id, chunk_count, linked)?;
            document_ops::set_status(conn, &document.id, DocumentStatus::Done)?;
            Ok(linked)
        })?;

        info!(
            "document {} ingested: {chunk_count} chunks, {inserted_count} new memories",
            document.id
        );
        Ok((chunk_count, memory_count))
    }

    fn chunk_memory(&self, document: &Document, chunk: &Chunk) -> Memory {
        let mut memory = Memory::new(chunk.text.clone(), MemoryType::DocumentChunk);
        memory.source_type = Some(document.source_type.clone());
        memory.source_id = Some(document.id.clone());
        memory.source_path = document.source_url.clone();
        memory.source_section = chunk.heading.clone();
        memory.embedding_model = self.embedder.as_ref().map(|e| e.model().to_string());
        memory.updated_by = Some(CHANGED_BY_PIPELINE.to_string());
        memory.importance = 0.3;
        memory
    }

    fn set_status(&self, document_id: &str, status: DocumentStatus) -> EngineResult<()> {
        self.storage
            .with_write_tx(|conn| document_ops::set_status(conn, document_id, status))?;
        Ok(())
    }
}
