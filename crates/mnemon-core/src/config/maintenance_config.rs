use serde::{Deserialize, Serialize};

/// Whether the maintenance worker only logs recommendations or also
/// executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceMode {
    #[default]
    Observe,
    Execute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub mode: MaintenanceMode,
    pub interval_ms: u64,
    /// Minimum gap between two executions of the same repair action.
    pub action_cooldown_ms: u64,
    /// Executions of one action allowed per rolling hour.
    pub action_hourly_budget: u32,
    /// Dead jobs over the last 24h above this fraction trigger a requeue.
    pub dead_rate_threshold: f64,
    /// Tombstone fraction above this triggers a retention sweep.
    pub tombstone_ratio_threshold: f64,
    /// FTS rows may exceed active memories by this factor before a
    /// consistency check is recommended.
    pub fts_ratio_threshold: f64,
    /// Dead jobs requeued per repair execution.
    pub requeue_batch_size: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            mode: MaintenanceMode::Observe,
            interval_ms: 60_000,
            action_cooldown_ms: 300_000,
            action_hourly_budget: 4,
            dead_rate_threshold: 0.01,
            tombstone_ratio_threshold: 0.3,
            fts_ratio_threshold: 1.1,
            requeue_batch_size: 50,
        }
    }
}
