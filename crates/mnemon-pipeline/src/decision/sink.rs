//! Mutation sinks: the single decision point between shadow and
//! controlled-write modes. Both consume the same verdict stream.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use mnemon_core::errors::EngineResult;
use mnemon_core::models::{
    ExtractedItem, HistoryEvent, HistoryRecord, Memory, Proposal, ProposalAction, WriteStats,
};
use mnemon_core::traits::EmbeddingProvider;
use mnemon_storage::queries::{embedding_ops, history_ops, memory_crud};
use mnemon_storage::StorageEngine;

use super::engine::{FactContext, Verdict};

/// Writer identity for applied mutations.
pub const CHANGED_BY_PIPELINE: &str = "pipeline-v2";
/// Writer identity for shadow records.
pub const CHANGED_BY_SHADOW: &str = "pipeline-shadow";

/// Consumes verdicts. Exactly one implementation mutates.
#[async_trait]
pub trait MutationSink: Send + Sync {
    /// Tag recorded on the job report ("shadow" or "phase-c").
    fn write_mode(&self) -> &'static str;

    async fn apply(
        &self,
        ctx: &FactContext,
        fact: &ExtractedItem,
        verdict: &Verdict,
        stats: &mut WriteStats,
    ) -> EngineResult<()>;
}

/// Controlled-write sink: applies proposals subject to the destructive
/// gate and pinned-target safety. Embeddings are fetched before the
/// write transaction opens.
pub struct ApplyMutations {
    storage: Arc<StorageEngine>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    allow_update_delete: bool,
}

impl ApplyMutations {
    pub fn new(
        storage: Arc<StorageEngine>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        allow_update_delete: bool,
    ) -> Self {
        Self {
            storage,
            embedder,
            allow_update_delete,
        }
    }

    /// Embed outside any transaction; `None` is fine, the memory is
    /// written without a vector.
    async fn fetch_embedding(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("embedding fetch failed, writing without vector: {e}");
                None
            }
        }
    }

    fn embedding_model(&self) -> Option<String> {
        self.embedder.as_ref().map(|e| e.model().to_string())
    }

    async fn apply_add(
        &self,
        ctx: &FactContext,
        fact: &ExtractedItem,
        proposal: &Proposal,
        stats: &mut WriteStats,
    ) -> EngineResult<()> {
        let mut memory = Memory::new(fact.content.clone(), fact.item_type);
        memory.confidence = fact.confidence;
        memory.source_type = ctx.source_type.clone();
        memory.source_id = ctx.source_memory_id.clone();
        memory.source_path = ctx.source_path.clone();
        memory.source_section = ctx.source_section.clone();
        memory.extraction_model = ctx.extraction_model.clone();
        memory.embedding_model = self.embedding_model();
        memory.updated_by = Some(CHANGED_BY_PIPELINE.to_string());

        let vector = self.fetch_embedding(&memory.content).await;
        let vector_enabled = self.storage.vector_enabled();

        let embedded = self.storage.with_write_tx(|conn| {
            memory_crud::insert_memory(conn, &memory)?;
            history_ops::append(
                conn,
                &HistoryRecord::new(&memory.id, HistoryEvent::Created, CHANGED_BY_PIPELINE)
                    .with_new_content(&memory.content)
                    .with_reason(proposal.reason.clone()),
            )?;
            if let Some(v) = &vector {
                embedding_ops::upsert_embedding(
                    conn,
                    &memory.content_hash,
                    v,
                    memory.source_type.as_deref(),
                    memory.source_id.as_deref(),
                    vector_enabled,
                )?;
                Ok(true)
            } else {
                Ok(false)
            }
        })?;

        stats.added += 1;
        if embedded {
            stats.embeddings_added += 1;
        }
        debug!("added memory {}", memory.id);
        Ok(())
    }

    async fn apply_update(
        &self,
        fact: &ExtractedItem,
        proposal: &Proposal,
        target_id: &str,
        stats: &mut WriteStats,
    ) -> EngineResult<()> {
        if !self.allow_update_delete {
            return self.record_blocked(target_id, proposal, stats);
        }

        let updated = Memory::new(fact.content.clone(), fact.item_type);
        let vector = self.fetch_embedding(&updated.content).await;
        let vector_enabled = self.storage.vector_enabled();

        let target_id = target_id.to_string();
        let embedded = self.storage.with_write_tx(|conn| {
            memory_crud::update_content(
                conn,
                &target_id,
                &updated.content,
                &updated.normalized_content,
                &updated.content_hash,
                CHANGED_BY_PIPELINE,
            )?;
            history_ops::append(
                conn,
                &HistoryRecord::new(&target_id, HistoryEvent::Updated, CHANGED_BY_PIPELINE)
                    .with_new_content(&updated.content)
                    .with_reason(proposal.reason.clone()),
            )?;
            if let Some(v) = &vector {
                embedding_ops::upsert_embedding(
                    conn,
                    &updated.content_hash,
                    v,
                    None,
                    None,
                    vector_enabled,
                )?;
                Ok(true)
            } else {
                Ok(false)
            }
        })?;

        stats.updated += 1;
        if embedded {
            stats.embeddings_added += 1;
        }
        Ok(())
    }

    fn apply_delete(
        &self,
        proposal: &Proposal,
        target_id: &str,
        stats: &mut WriteStats,
    ) -> EngineResult<()> {
        let target = self
            .storage
            .with_read(|conn| memory_crud::get_memory(conn, target_id))?;
        let Some(target) = target else {
            warn!("delete target {target_id} vanished, recording none");
            return Ok(());
        };

        if target.pinned {
            self.storage.with_write_tx(|conn| {
                history_ops::append(
                    conn,
                    &HistoryRecord::new(target_id, HistoryEvent::None, CHANGED_BY_PIPELINE)
                        .with_reason(proposal.reason.clone())
                        .with_metadata(json!({
                            "skippedReason": "delete_pinned_requires_force",
                            "proposedAction": "delete",
                        })),
                )
            })?;
            return Ok(());
        }

        if !self.allow_update_delete {
            return self.record_blocked(target_id, proposal, stats);
        }

        self.storage.with_write_tx(|conn| {
            memory_crud::soft_delete(conn, target_id, CHANGED_BY_PIPELINE)?;
            history_ops::append(
                conn,
                &HistoryRecord::new(target_id, HistoryEvent::Deleted, CHANGED_BY_PIPELINE)
                    .with_reason(proposal.reason.clone()),
            )
        })?;
        stats.deleted += 1;
        Ok(())
    }

    /// Destructive mutations disabled: the contradiction is real but the
    /// resolution needs a human. Flag for review, mutate nothing.
    fn record_blocked(
        &self,
        target_id: &str,
        proposal: &Proposal,
        stats: &mut WriteStats,
    ) -> EngineResult<()> {
        self.storage.with_write_tx(|conn| {
            history_ops::append(
                conn,
                &HistoryRecord::new(target_id, HistoryEvent::None, CHANGED_BY_PIPELINE)
                    .with_reason(proposal.reason.clone())
                    .with_metadata(json!({
                        "blockedReason": "destructive_mutations_disabled",
                        "reviewNeeded": true,
                        "proposedAction": proposal.action.as_str(),
                    })),
            )
        })?;
        stats.blocked_destructive += 1;
        stats.review_needed += 1;
        Ok(())
    }
}

#[async_trait]
impl MutationSink for ApplyMutations {
    fn write_mode(&self) -> &'static str {
        "phase-c"
    }

    async fn apply(
        &self,
        ctx: &FactContext,
        fact: &ExtractedItem,
        verdict: &Verdict,
        stats: &mut WriteStats,
    ) -> EngineResult<()> {
        match verdict {
            Verdict::SkippedLowConfidence => {
                let memory_id = ctx.source_memory_id.clone().unwrap_or_default();
                self.storage.with_write_tx(|conn| {
                    history_ops::append(
                        conn,
                        &HistoryRecord::new(memory_id, HistoryEvent::None, CHANGED_BY_PIPELINE)
                            .with_metadata(json!({
                                "skippedReason": "low_fact_confidence",
                                "confidence": fact.confidence,
                            })),
                    )
                })?;
                stats.skipped_low_confidence += 1;
                Ok(())
            }
            Verdict::Deduped { existing_id } => {
                self.storage.with_write_tx(|conn| {
                    history_ops::append(
                        conn,
                        &HistoryRecord::new(
                            existing_id.as_str(),
                            HistoryEvent::None,
                            CHANGED_BY_PIPELINE,
                        )
                        .with_metadata(json!({ "dedupedExistingId": existing_id })),
                    )
                })?;
                stats.deduped += 1;
                Ok(())
            }
            Verdict::Decided(proposal) => match (proposal.action, proposal.target_id.as_deref()) {
                (ProposalAction::Add, _) => self.apply_add(ctx, fact, proposal, stats).await,
                (ProposalAction::Update, Some(target)) => {
                    self.apply_update(fact, proposal, target, stats).await
                }
                (ProposalAction::Delete, Some(target)) => {
                    self.apply_delete(proposal, target, stats)
                }
                (action, target) => {
                    // NONE, or a destructive action with no target.
                    let memory_id = target
                        .map(str::to_string)
                        .or_else(|| ctx.source_memory_id.clone())
                        .unwrap_or_default();
                    self.storage.with_write_tx(|conn| {
                        history_ops::append(
                            conn,
                            &HistoryRecord::new(
                                memory_id,
                                HistoryEvent::None,
                                CHANGED_BY_PIPELINE,
                            )
                            .with_reason(proposal.reason.clone())
                            .with_metadata(json!({ "proposedAction": action.as_str() })),
                        )
                    })?;
                    Ok(())
                }
            },
        }
    }
}

/// Shadow sink: the pipeline runs end to end, but every verdict lands as
/// an `event = none` history row and no memory row changes.
pub struct RecordShadowOnly {
    storage: Arc<StorageEngine>,
}

impl RecordShadowOnly {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MutationSink for RecordShadowOnly {
    fn write_mode(&self) -> &'static str {
        "shadow"
    }

    async fn apply(
        &self,
        ctx: &FactContext,
        fact: &ExtractedItem,
        verdict: &Verdict,
        stats: &mut WriteStats,
    ) -> EngineResult<()> {
        let (memory_id, mut metadata) = match verdict {
            Verdict::SkippedLowConfidence => {
                stats.skipped_low_confidence += 1;
                (
                    ctx.source_memory_id.clone().unwrap_or_default(),
                    json!({
                        "skippedReason": "low_fact_confidence",
                        "proposedAction": "none",
                        "confidence": fact.confidence,
                    }),
                )
            }
            Verdict::Deduped { existing_id } => {
                stats.deduped += 1;
                (
                    existing_id.clone(),
                    json!({
                        "dedupedExistingId": existing_id,
                        "proposedAction": "none",
                    }),
                )
            }
            Verdict::Decided(proposal) => (
                proposal
                    .target_id
                    .clone()
                    .or_else(|| ctx.source_memory_id.clone())
                    .unwrap_or_default(),
                json!({
                    "proposedAction": proposal.action.as_str(),
                    "targetId": proposal.target_id,
                    "reason": proposal.reason,
                }),
            ),
        };
        if let Some(map) = metadata.as_object_mut() {
            map.insert("shadow".to_string(), json!(true));
        }

        self.storage.with_write_tx(|conn| {
            history_ops::append(
                conn,
                &HistoryRecord::new(memory_id, HistoryEvent::None, CHANGED_BY_SHADOW)
                    .with_metadata(metadata),
            )
        })?;
        Ok(())
    }
}
