//! Extraction worker: leases `extract` jobs, runs the extractor, feeds
//! each fact through the decision engine, applies or shadows proposals,
//! and completes the job with the write report.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use mnemon_core::errors::{EngineResult, QueueError};
use mnemon_core::models::{
    EntityMention, ExtractionStatus, Job, JobReport, JobType, Relation,
};
use mnemon_llm::{ExtractOutcome, Extractor};
use mnemon_observability::{ProviderOutcome, SharedProviderTracker};
use mnemon_storage::queries::{graph_ops, memory_crud};
use mnemon_storage::StorageEngine;

use crate::decision::{DecisionEngine, FactContext, MutationSink, Verdict};
use crate::queue::JobQueue;
use crate::workers::handle::{Tick, WorkerHandle};

/// One extractor per flavor; the source memory's provenance picks which
/// one runs.
struct ExtractorSet {
    document: Extractor,
    chat: Extractor,
    session: Extractor,
}

impl ExtractorSet {
    fn for_source(&self, source_type: Option<&str>) -> &Extractor {
        match source_type {
            Some("chat" | "slack" | "discord") => &self.chat,
            Some("session" | "transcript") => &self.session,
            _ => &self.document,
        }
    }
}

pub struct ExtractionWorker {
    storage: Arc<StorageEngine>,
    queue: JobQueue,
    extractors: ExtractorSet,
    engine: Arc<DecisionEngine>,
    sink: Arc<dyn MutationSink>,
    tracker: SharedProviderTracker,
    max_retries: u32,
}

impl ExtractionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        storage: Arc<StorageEngine>,
        queue: JobQueue,
        provider: Arc<dyn mnemon_core::traits::LlmProvider>,
        parse_floor: f64,
        llm_timeout: Duration,
        llm_max_tokens: u32,
        engine: Arc<DecisionEngine>,
        sink: Arc<dyn MutationSink>,
        tracker: SharedProviderTracker,
        poll: Duration,
        max_retries: u32,
    ) -> WorkerHandle {
        let build = |flavor| {
            Extractor::new(
                Arc::clone(&provider),
                flavor,
                parse_floor,
                llm_timeout,
                llm_max_tokens,
            )
        };
        let worker = Arc::new(Self {
            storage,
            queue,
            extractors: ExtractorSet {
                document: build(mnemon_llm::ExtractorFlavor::Document),
                chat: build(mnemon_llm::ExtractorFlavor::Chat),
                session: build(mnemon_llm::ExtractorFlavor::Session),
            },
            engine,
            sink,
            tracker,
            max_retries,
        });
        WorkerHandle::spawn("extraction", poll, move || {
            let worker = Arc::clone(&worker);
            async move { worker.tick().await }
        })
    }

    async fn tick(&self) -> EngineResult<Tick> {
        let Some(job) = self.queue.lease(JobType::Extract, self.max_retries)? else {
            return Ok(Tick::Idle);
        };

        match self.process(&job).await {
            Ok(report) => {
                let payload = serde_json::to_value(&report)?;
                self.queue.complete(&job, Some(payload))?;
                Ok(Tick::Worked)
            }
            Err(e) => {
                let status = self.queue.fail(&job, &e.to_string(), self.max_retries)?;
                warn!("extract job {} failed ({e}), now {:?}", job.id, status);
                if let Some(memory_id) = &job.memory_id {
                    let _ = self.storage.with_write_tx(|conn| {
                        memory_crud::set_extraction_status(
                            conn,
                            memory_id,
                            ExtractionStatus::Failed,
                            None,
                        )
                    });
                }
                Err(e)
            }
        }
    }

    async fn process(&self, job: &Job) -> EngineResult<JobReport> {
        let memory_id = job.memory_id.as_deref().ok_or_else(|| QueueError::MissingKey {
            id: job.id.clone(),
            field: "memory_id",
        })?;

        let source = self
            .storage
            .with_read(|conn| memory_crud::get_memory(conn, memory_id))?
            .ok_or_else(|| mnemon_core::errors::StorageError::NotFound {
                table: "memories",
                id: memory_id.to_string(),
            })?;

        let extractor = self.extractors.for_source(source.source_type.as_deref());
        let (extraction, outcome) = extractor.extract(&source.content).await;
        self.record_outcome(outcome);

        let mut report = JobReport::new(self.sink.write_mode());
        report.warnings = extraction.warnings.clone();
        report.facts = extraction.items.clone();
        report.entities = extraction.relations.clone();

        let ctx = FactContext {
            source_memory_id: Some(source.id.clone()),
            source_type: source.source_type.clone(),
            source_path: source.source_path.clone(),
            source_section: source.source_section.clone(),
            extraction_model: Some(extractor.provider_name().to_string()),
        };

        for fact in &extraction.items {
            let verdict = self.engine.decide(fact).await?;
            if let Verdict::Decided(proposal) = &verdict {
                report.proposals.push(proposal.clone());
            } else {
                report.proposals.push(verdict_as_proposal(&verdict));
            }
            self.sink
                .apply(&ctx, fact, &verdict, &mut report.write_stats)
                .await?;
        }

        // Relations land in the graph only when the sink mutates.
        if self.sink.write_mode() != "shadow" && !extraction.relations.is_empty() {
            self.index_relations(&source.id, &extraction)?;
        }

        self.storage.with_write_tx(|conn| {
            memory_crud::set_extraction_status(
                conn,
                &source.id,
                ExtractionStatus::Completed,
                Some(extractor.provider_name()),
            )
        })?;

        info!(
            "extracted {} facts from memory {} ({} warnings)",
            report.facts.len(),
            source.id,
            report.warnings.len()
        );
        Ok(report)
    }

    fn record_outcome(&self, outcome: ExtractOutcome) {
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.record(match outcome {
                ExtractOutcome::Success => ProviderOutcome::Success,
                ExtractOutcome::Failure => ProviderOutcome::Failure,
                ExtractOutcome::Timeout => ProviderOutcome::Timeout,
            });
        }
    }

    fn index_relations(
        &self,
        source_memory_id: &str,
        extraction: &mnemon_core::models::ExtractionResult,
    ) -> EngineResult<()> {
        let source_memory_id = source_memory_id.to_string();
        let relations = extraction.relations.clone();
        self.storage.with_write_tx(move |conn| {
            for relation in &relations {
                let source_id = graph_ops::upsert_entity(conn, &relation.source)?;
                let target_id = graph_ops::upsert_entity(conn, &relation.target)?;
                let mut row = Relation::new(&source_id, &target_id, &relation.relationship);
                row.confidence = relation.confidence;
                graph_ops::upsert_relation(conn, &row)?;
                for entity_id in [&source_id, &target_id] {
                    graph_ops::link_mention(
                        conn,
                        &EntityMention {
                            memory_id: source_memory_id.clone(),
                            entity_id: entity_id.clone(),
                        },
                    )?;
                }
            }
            Ok(())
        })?;
        Ok(())
    }
}

fn verdict_as_proposal(verdict: &Verdict) -> mnemon_core::models::Proposal {
    use mnemon_core::models::Proposal;
    match verdict {
        Verdict::SkippedLowConfidence => Proposal::none("low_fact_confidence"),
        Verdict::Deduped { existing_id } => {
            let mut p = Proposal::none("deduped");
            p.target_id = Some(existing_id.clone());
            p
        }
        Verdict::Decided(p) => p.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_as_proposal_maps_dedup() {
        let p = verdict_as_proposal(&Verdict::Deduped {
            existing_id: "m-1".to_string(),
        });
        assert_eq!(p.target_id.as_deref(), Some("m-1"));
    }
}
