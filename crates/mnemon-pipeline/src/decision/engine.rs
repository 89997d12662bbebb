//! Verdict construction: confidence gate → hash dedup → candidate
//! retrieval → contradiction checks → proposal.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use mnemon_core::config::PipelineConfig;
use mnemon_core::errors::EngineResult;
use mnemon_core::models::{
    compute_content_hash, normalize_content, ExtractedItem, Proposal, ProposalAction,
};
use mnemon_core::traits::{GenerateOptions, LlmProvider};
use mnemon_retrieval::RecallEngine;
use mnemon_storage::{queries::memory_crud, StorageEngine};

use super::contradiction;

/// Provenance carried alongside an extracted fact.
#[derive(Debug, Clone, Default)]
pub struct FactContext {
    pub source_memory_id: Option<String>,
    pub source_type: Option<String>,
    pub source_path: Option<String>,
    pub source_section: Option<String>,
    pub extraction_model: Option<String>,
}

/// What the engine concluded for one fact.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Below the write-confidence gate; nothing retrieved or compared.
    SkippedLowConfidence,
    /// A live memory already carries this exact normalized content.
    Deduped { existing_id: String },
    /// A concrete proposal, possibly destructive.
    Decided(Proposal),
}

pub struct DecisionEngine {
    storage: Arc<StorageEngine>,
    recall: Arc<RecallEngine>,
    /// Used for the slow-path semantic contradiction check only.
    provider: Option<Arc<dyn LlmProvider>>,
    config: PipelineConfig,
}

impl DecisionEngine {
    pub fn new(
        storage: Arc<StorageEngine>,
        recall: Arc<RecallEngine>,
        provider: Option<Arc<dyn LlmProvider>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            storage,
            recall,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn decide(&self, fact: &ExtractedItem) -> EngineResult<Verdict> {
        // 1. Confidence gate.
        if fact.confidence < self.config.min_fact_confidence_for_write {
            return Ok(Verdict::SkippedLowConfidence);
        }

        // 2. Normalization / dedup.
        let normalized = normalize_content(&fact.content);
        let hash = compute_content_hash(&normalized);
        if let Some(existing) = self
            .storage
            .with_read(|conn| memory_crud::get_live_by_hash(conn, &hash))?
        {
            return Ok(Verdict::Deduped {
                existing_id: existing.id,
            });
        }

        // 3. Candidate retrieval.
        let candidates = self
            .recall
            .recall(&fact.content, self.config.max_candidates, 0.0)
            .await?;

        // 4 + 5. Contradiction checks against overlapping candidates.
        let mut best_similar: Option<(String, f64)> = None;
        for candidate in &candidates {
            let overlap = contradiction::lexical_overlap(&candidate.content, &fact.content);
            if overlap < self.config.min_lexical_overlap {
                continue;
            }

            if contradiction::syntactic_contradiction(&candidate.content, &fact.content) {
                debug!("syntactic contradiction with {}", candidate.id);
                return Ok(Verdict::Decided(self.contradiction_proposal(candidate, fact)));
            }

            if self
                .semantic_contradiction(&candidate.content, &fact.content)
                .await
            {
                debug!("semantic contradiction with {}", candidate.id);
                return Ok(Verdict::Decided(self.contradiction_proposal(candidate, fact)));
            }

            match &best_similar {
                Some((_, score)) if *score >= candidate.score => {}
                _ => best_similar = Some((candidate.id.clone(), candidate.score)),
            }
        }

        // 6. Decide.
        if let Some((id, score)) = best_similar {
            if score >= 0.9 {
                // Near-duplicate of a live memory: nothing to write.
                return Ok(Verdict::Decided(Proposal {
                    action: ProposalAction::None,
                    target_id: Some(id),
                    confidence: fact.confidence,
                    reason: format!("near_duplicate score {score:.2}"),
                }));
            }
        }

        Ok(Verdict::Decided(Proposal::add(
            fact.confidence,
            "no dedup, contradiction, or near-duplicate",
        )))
    }

    /// Contradiction resolution: a bare negation retracts (DELETE), a
    /// substantive restatement replaces (UPDATE). The sink still gates
    /// both behind `allow_update_delete` and pinned targets.
    fn contradiction_proposal(
        &self,
        candidate: &mnemon_retrieval::RankedMemory,
        fact: &ExtractedItem,
    ) -> Proposal {
        let incoming_tokens = contradiction::tokenize(&fact.content);
        let existing_tokens = contradiction::tokenize(&candidate.content);
        let adds_substance = incoming_tokens.difference(&existing_tokens).count() > 2;

        Proposal {
            action: if adds_substance {
                ProposalAction::Update
            } else {
                ProposalAction::Delete
            },
            target_id: Some(candidate.id.clone()),
            confidence: fact.confidence,
            reason: "contradicts existing memory".to_string(),
        }
    }

    /// Slow path: ask the LLM whether the statements conflict. Only
    /// trusted above the configured confidence floor.
    async fn semantic_contradiction(&self, existing: &str, incoming: &str) -> bool {
        let Some(provider) = &self.provider else {
            return false;
        };
        let prompt = mnemon_llm::extractor::contradiction_prompt(existing, incoming);
        let response = match provider.generate(&prompt, GenerateOptions::default()).await {
            Ok(text) => text,
            Err(e) => {
                warn!("semantic contradiction check failed: {e}");
                return false;
            }
        };

        let Ok(value) = serde_json::from_str::<Value>(extract_json(&response)) else {
            return false;
        };
        let contradicts = value
            .get("contradicts")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        contradicts && confidence >= self.config.semantic_contradiction_confidence
    }
}

fn extract_json(text: &str) -> &str {
    let start = text.find('{').unwrap_or(0);
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    text.get(start..end).unwrap_or(text)
}
