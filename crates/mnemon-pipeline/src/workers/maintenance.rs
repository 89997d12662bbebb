//! Maintenance worker: diagnostics each cycle, one recommendation per
//! violation, observe/execute split, and the stale-lease reaper.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use mnemon_core::config::{MaintenanceConfig, MaintenanceMode};
use mnemon_core::errors::EngineResult;
use mnemon_observability::{Diagnostics, HealthDomain, HealthReport};

use crate::queue::JobQueue;
use crate::repair::{RepairAction, RepairRunner};
use crate::workers::handle::{Tick, WorkerHandle};

pub struct MaintenanceWorker {
    queue: JobQueue,
    diagnostics: Arc<Diagnostics>,
    runner: Mutex<RepairRunner>,
    config: MaintenanceConfig,
    lease_timeout: Duration,
}

impl MaintenanceWorker {
    pub fn start(
        queue: JobQueue,
        diagnostics: Arc<Diagnostics>,
        runner: RepairRunner,
        config: MaintenanceConfig,
        lease_timeout: Duration,
    ) -> WorkerHandle {
        let interval = Duration::from_millis(config.interval_ms);
        let worker = Arc::new(Self {
            queue,
            diagnostics,
            runner: Mutex::new(runner),
            config,
            lease_timeout,
        });
        WorkerHandle::spawn("maintenance", interval, move || {
            let worker = Arc::clone(&worker);
            async move { worker.tick() }
        })
    }

    fn tick(&self) -> EngineResult<Tick> {
        let report = self.diagnostics.run()?;
        let recommendations = recommend_actions(&report, &self.config);

        // The stale-lease reaper is queue hygiene, not repair: it runs
        // every cycle in both modes.
        let reaped = self.queue.reap_stale(self.lease_timeout)?;
        if reaped > 0 {
            info!("reaped {reaped} stale leases");
        }

        if recommendations.is_empty() {
            return Ok(Tick::Idle);
        }

        match self.config.mode {
            MaintenanceMode::Observe => {
                for action in &recommendations {
                    info!(
                        "maintenance (observe): would run {} (composite {:.2})",
                        action.as_str(),
                        report.composite_score
                    );
                }
            }
            MaintenanceMode::Execute => {
                let pre_score = report.composite_score;
                let mut runner = self
                    .runner
                    .lock()
                    .map_err(|_| mnemon_core::EngineError::Lifecycle(
                        "repair runner mutex poisoned".to_string(),
                    ))?;
                for action in &recommendations {
                    if !runner.admissible(*action) {
                        info!("repair {} skipped: budget or halt", action.as_str());
                        continue;
                    }
                    if let Err(e) = runner.execute(*action) {
                        warn!("repair {} failed: {e}", action.as_str());
                        continue;
                    }
                    let post_score = self.diagnostics.run()?.composite_score;
                    runner.record_outcome(*action, pre_score, post_score);
                }
            }
        }

        Ok(Tick::Worked)
    }

}

/// One recommendation per violated threshold.
pub fn recommend_actions(report: &HealthReport, config: &MaintenanceConfig) -> Vec<RepairAction> {
    let mut actions = Vec::new();

    let signal = |domain: HealthDomain, name: &str| -> Option<f64> {
        report
            .domain(domain)?
            .signals
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.parse().ok())
    };

    if signal(HealthDomain::Queue, "dead_rate_24h").unwrap_or(0.0) > config.dead_rate_threshold {
        actions.push(RepairAction::RequeueDeadJobs);
    }
    if signal(HealthDomain::Queue, "stale_leases").unwrap_or(0.0) > 0.0 {
        actions.push(RepairAction::ReleaseStaleLeases);
    }
    if signal(HealthDomain::Index, "fts_ratio").is_some_and(|r| r > config.fts_ratio_threshold) {
        actions.push(RepairAction::CheckFtsConsistency);
    }
    if signal(HealthDomain::Storage, "tombstone_ratio")
        .is_some_and(|r| r > config.tombstone_ratio_threshold)
    {
        actions.push(RepairAction::TriggerRetentionSweep);
    }

    actions
}
