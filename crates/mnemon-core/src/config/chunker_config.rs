use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub max_tokens: usize,
    /// Chunks below this estimate are discarded.
    pub min_tokens: usize,
    /// Tail of the previous chunk seeded into the next one.
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            min_tokens: 100,
            overlap_tokens: 200,
        }
    }
}
