use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// α in `score = α·lexical + (1-α)·vector + boost_weight·graph`.
    pub lexical_weight: f64,
    pub graph_boost_weight: f64,
    pub graph_deadline_ms: u64,
    pub graph_max_neighbors: usize,
    pub graph_max_linked_memories: usize,
    pub rerank_enabled: bool,
    pub rerank_top_n: usize,
    /// Weight of the rerank cosine vs the pre-rerank score.
    pub rerank_blend: f64,
    pub default_top_k: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.6,
            graph_boost_weight: 0.15,
            graph_deadline_ms: 500,
            graph_max_neighbors: 50,
            graph_max_linked_memories: 200,
            rerank_enabled: false,
            rerank_top_n: 20,
            rerank_blend: 0.3,
            default_top_k: 10,
        }
    }
}
