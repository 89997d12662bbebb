//! Bounded self-healing. Each repair action is a small idempotent write
//! under the accessor's transaction discipline; the runner enforces a
//! per-action cooldown, an hourly budget, and a halt after repeated
//! non-improvement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use mnemon_core::config::{MaintenanceConfig, RetentionConfig};
use mnemon_core::errors::EngineResult;
use mnemon_storage::queries::job_ops;
use mnemon_storage::{fts, StorageEngine};

use crate::workers::sweep_once;

/// Repair actions the maintenance worker may recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairAction {
    RequeueDeadJobs,
    ReleaseStaleLeases,
    CheckFtsConsistency,
    TriggerRetentionSweep,
}

impl RepairAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequeueDeadJobs => "requeue_dead_jobs",
            Self::ReleaseStaleLeases => "release_stale_leases",
            Self::CheckFtsConsistency => "check_fts_consistency",
            Self::TriggerRetentionSweep => "trigger_retention_sweep",
        }
    }
}

/// Consecutive non-improving executions before an action is halted.
const HALT_AFTER: u32 = 3;

#[derive(Debug, Default)]
struct ActionState {
    last_run: Option<Instant>,
    hour_window_start: Option<Instant>,
    runs_this_hour: u32,
    no_improvement_streak: u32,
    halted: bool,
}

pub struct RepairRunner {
    storage: Arc<StorageEngine>,
    maintenance: MaintenanceConfig,
    retention: RetentionConfig,
    lease_timeout: Duration,
    states: HashMap<RepairAction, ActionState>,
}

impl RepairRunner {
    pub fn new(
        storage: Arc<StorageEngine>,
        maintenance: MaintenanceConfig,
        retention: RetentionConfig,
        lease_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            maintenance,
            retention,
            lease_timeout,
            states: HashMap::new(),
        }
    }

    /// Whether the budget admits this action right now.
    pub fn admissible(&self, action: RepairAction) -> bool {
        let Some(state) = self.states.get(&action) else {
            return true;
        };
        if state.halted {
            return false;
        }
        if let Some(last) = state.last_run {
            if last.elapsed() < Duration::from_millis(self.maintenance.action_cooldown_ms) {
                return false;
            }
        }
        let in_window = state
            .hour_window_start
            .is_some_and(|start| start.elapsed() < Duration::from_secs(3600));
        if in_window && state.runs_this_hour >= self.maintenance.action_hourly_budget {
            return false;
        }
        true
    }

    /// Run one action and settle its budget. `pre_score`/`post_score`
    /// come from the caller's diagnostics; a post ≤ pre streak of
    /// `HALT_AFTER` halts the action until `reset`.
    pub fn execute(&mut self, action: RepairAction) -> EngineResult<usize> {
        let affected = match action {
            RepairAction::RequeueDeadJobs => {
                let batch = self.maintenance.requeue_batch_size;
                self.storage
                    .with_write_tx(|conn| job_ops::requeue_dead(conn, batch))?
            }
            RepairAction::ReleaseStaleLeases => {
                let timeout = chrono::Duration::from_std(self.lease_timeout)
                    .unwrap_or_else(|_| chrono::Duration::minutes(10));
                self.storage
                    .with_write_tx(|conn| job_ops::reap_stale_leases(conn, timeout))?
            }
            RepairAction::CheckFtsConsistency => {
                let (fts_rows, active) = self.storage.with_read(fts::parity_counts)?;
                let drifted = active > 0
                    && fts_rows as f64 > active as f64 * self.maintenance.fts_ratio_threshold;
                if drifted || fts_rows < active {
                    self.storage.with_write_tx(|conn| fts::rebuild(conn))?
                } else {
                    0
                }
            }
            RepairAction::TriggerRetentionSweep => {
                sweep_once(&self.storage, &self.retention)?
            }
        };

        let now = Instant::now();
        let state = self.states.entry(action).or_default();
        state.last_run = Some(now);
        let window_expired = state
            .hour_window_start
            .map_or(true, |start| start.elapsed() >= Duration::from_secs(3600));
        if window_expired {
            state.hour_window_start = Some(now);
            state.runs_this_hour = 0;
        }
        state.runs_this_hour += 1;

        info!("repair {} affected {affected} rows", action.as_str());
        Ok(affected)
    }

    /// Record the score movement this action produced.
    pub fn record_outcome(&mut self, action: RepairAction, pre_score: f64, post_score: f64) {
        let state = self.states.entry(action).or_default();
        if post_score <= pre_score {
            state.no_improvement_streak += 1;
            if state.no_improvement_streak >= HALT_AFTER && !state.halted {
                warn!(
                    "repair {} halted after {} non-improving runs",
                    action.as_str(),
                    state.no_improvement_streak
                );
                state.halted = true;
            }
        } else {
            state.no_improvement_streak = 0;
        }
    }

    pub fn is_halted(&self, action: RepairAction) -> bool {
        self.states.get(&action).is_some_and(|s| s.halted)
    }

    /// Human reset: clears halts and streaks.
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            state.halted = false;
            state.no_improvement_streak = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::config::{MaintenanceConfig, RetentionConfig};

    fn runner() -> RepairRunner {
        let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
        RepairRunner::new(
            storage,
            MaintenanceConfig::default(),
            RetentionConfig::default(),
            Duration::from_secs(600),
        )
    }

    #[test]
    fn test_halts_after_three_non_improvements() {
        let mut runner = runner();
        let action = RepairAction::ReleaseStaleLeases;
        for _ in 0..3 {
            assert!(!runner.is_halted(action));
            runner.record_outcome(action, 0.5, 0.5);
        }
        assert!(runner.is_halted(action));
        assert!(!runner.admissible(action));
        runner.reset();
        assert!(!runner.is_halted(action));
    }

    #[test]
    fn test_cooldown_blocks_immediate_rerun() {
        let mut runner = runner();
        let action = RepairAction::ReleaseStaleLeases;
        assert!(runner.admissible(action));
        runner.execute(action).unwrap();
        assert!(!runner.admissible(action), "cooldown should gate rerun");
    }

    #[test]
    fn test_improvement_resets_streak() {
        let mut runner = runner();
        let action = RepairAction::RequeueDeadJobs;
        runner.record_outcome(action, 0.5, 0.4);
        runner.record_outcome(action, 0.4, 0.6);
        runner.record_outcome(action, 0.6, 0.5);
        assert!(!runner.is_halted(action));
    }
}
