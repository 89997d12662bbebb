use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enabled: bool,
    /// Run the full pipeline but record proposals without mutating.
    pub shadow_mode: bool,
    /// Permit UPDATE/DELETE proposals to be applied.
    pub allow_update_delete: bool,
    /// Emergency brake: no mutation of any kind is applied.
    pub mutations_frozen: bool,
    /// Gates the maintenance and retention workers.
    pub autonomous_enabled: bool,
    pub min_fact_confidence_for_write: f64,
    pub worker_poll_ms: u64,
    pub worker_max_retries: u32,
    pub lease_timeout_ms: u64,
    /// Minimum shared tokens before two statements are compared for
    /// contradiction.
    pub min_lexical_overlap: usize,
    /// Minimum LLM confidence for a semantic contradiction verdict.
    pub semantic_contradiction_confidence: f64,
    /// Candidates retrieved per extracted fact.
    pub max_candidates: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shadow_mode: true,
            allow_update_delete: false,
            mutations_frozen: false,
            autonomous_enabled: true,
            min_fact_confidence_for_write: 0.6,
            worker_poll_ms: 2000,
            worker_max_retries: 3,
            lease_timeout_ms: 600_000,
            min_lexical_overlap: 3,
            semantic_contradiction_confidence: 0.7,
            max_candidates: 10,
        }
    }
}
