//! # mnemon-retrieval
//!
//! Hybrid recall over the store: BM25 lexical + cosine vector + a
//! deadline-bounded knowledge-graph boost, blended by config weights,
//! with an optional embedding rerank of the head.

mod graph_boost;
mod rerank;

pub use graph_boost::{GraphBoost, GraphBoostOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mnemon_core::config::RecallConfig;
use mnemon_core::errors::EngineResult;
use mnemon_core::models::MemoryType;
use mnemon_core::traits::EmbeddingProvider;
use mnemon_storage::{fts, queries::memory_crud, StorageEngine};

/// One recall result, ordered by blended score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMemory {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub score: f64,
    pub source_section: Option<String>,
    pub source_path: Option<String>,
    /// Entities linking this memory to the query (direct or one-hop).
    pub entity_hits: u32,
}

pub struct RecallEngine {
    storage: Arc<StorageEngine>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: RecallConfig,
}

#[derive(Default)]
struct CandidateScores {
    lexical: f64,
    vector: f64,
    graph: f64,
    entity_hits: u32,
}

impl RecallEngine {
    pub fn new(
        storage: Arc<StorageEngine>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: RecallConfig,
    ) -> Self {
        Self {
            storage,
            embedder,
            config,
        }
    }

    /// Hybrid recall. `min_score` filters on the blended score.
    pub async fn recall(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
    ) -> EngineResult<Vec<RankedMemory>> {
        let mut candidates: HashMap<String, CandidateScores> = HashMap::new();
        let fetch = (top_k.max(self.config.default_top_k)) * 3;

        // Lexical.
        let lexical_hits = self
            .storage
            .with_read(|conn| fts::search(conn, query, fetch))?;
        for hit in lexical_hits {
            candidates.entry(hit.memory_id).or_default().lexical = hit.score;
        }

        // Vector, when both the index and an embedder exist.
        let query_vector = match &self.embedder {
            Some(embedder) if self.storage.vector_enabled() => {
                match embedder.embed(query).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("query embedding failed, vector leg skipped: {e}");
                        None
                    }
                }
            }
            _ => None,
        };
        if let Some(vector) = &query_vector {
            let vec_hits = self
                .storage
                .with_read(|conn| mnemon_storage::vector::knn(conn, vector, fetch))?;
            for hit in vec_hits {
                candidates.entry(hit.memory_id).or_default().vector = hit.score;
            }
        }

        // Graph boost against its wall-clock deadline.
        let boost = GraphBoost::new(&self.config).run(&self.storage, query)?;
        if boost.timed_out {
            debug!("graph boost hit its deadline, partial results kept");
        }
        let max_hits = boost.hits.values().copied().max().unwrap_or(0).max(1);
        for (memory_id, hits) in &boost.hits {
            let entry = candidates.entry(memory_id.clone()).or_default();
            entry.entity_hits = *hits;
            entry.graph = f64::from(*hits) / f64::from(max_hits);
        }

        // Blend and materialize.
        let alpha = self.config.lexical_weight;
        let ids: Vec<String> = candidates.keys().cloned().collect();
        let memories = self
            .storage
            .with_read(|conn| memory_crud::get_many(conn, &ids))?;

        let mut ranked: Vec<(RankedMemory, chrono::DateTime<chrono::Utc>)> = memories
            .into_iter()
            .filter(|m| !m.is_deleted)
            .filter_map(|m| {
                let scores = candidates.get(&m.id)?;
                let blended = alpha * scores.lexical
                    + (1.0 - alpha) * scores.vector
                    + self.config.graph_boost_weight * scores.graph;
                Some((
                    RankedMemory {
                        id: m.id.clone(),
                        content: m.content,
                        memory_type: m.memory_type,
                        score: blended,
                        source_section: m.source_section,
                        source_path: m.source_path,
                        entity_hits: scores.entity_hits,
                    },
                    m.created_at,
                ))
            })
            .collect();

        // Optional rerank of the head against the query embedding.
        if self.config.rerank_enabled {
            if let Some(vector) = &query_vector {
                rerank::rerank_head(
                    &self.storage,
                    &mut ranked,
                    vector,
                    self.config.rerank_top_n,
                    self.config.rerank_blend,
                )?;
            }
        }

        // Stable order: score desc, then created_at desc, then id.
        ranked.sort_by(|(a, a_created), (b, b_created)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_created.cmp(a_created))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(ranked
            .into_iter()
            .map(|(m, _)| m)
            .filter(|m| m.score >= min_score)
            .take(top_k)
            .collect())
    }
}
