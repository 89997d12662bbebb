use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Tombstones older than this are purged by the sweep.
    pub tombstone_horizon_days: i64,
    pub sweep_batch_size: usize,
    pub sweep_interval_ms: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            tombstone_horizon_days: 30,
            sweep_batch_size: 200,
            sweep_interval_ms: 3_600_000,
        }
    }
}
