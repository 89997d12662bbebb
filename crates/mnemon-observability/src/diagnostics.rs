//! Six-domain health scoring. Read-only; every signal comes from the
//! store counters or the provider tracker.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use mnemon_core::errors::EngineResult;
use mnemon_core::models::HistoryEvent;
use mnemon_storage::queries::{connector_ops, embedding_ops, history_ops, job_ops, stats_ops};
use mnemon_storage::{fts, StorageEngine};

use crate::provider_tracker::SharedProviderTracker;
use crate::report::{DomainHealth, HealthDomain, HealthReport};

/// Leases older than this count as stale for scoring.
const STALE_LEASE_MINUTES: i64 = 10;

pub struct Diagnostics {
    storage: Arc<StorageEngine>,
    tracker: SharedProviderTracker,
}

impl Diagnostics {
    pub fn new(storage: Arc<StorageEngine>, tracker: SharedProviderTracker) -> Self {
        Self { storage, tracker }
    }

    pub fn run(&self) -> EngineResult<HealthReport> {
        let queue = self.score_queue()?;
        let storage = self.score_storage()?;
        let index = self.score_index()?;
        let provider = self.score_provider();
        let mutation = self.score_mutation()?;
        let connector = self.score_connector()?;

        let report = HealthReport::from_domains(vec![
            queue, storage, index, provider, mutation, connector,
        ]);
        debug!(
            "diagnostics composite {:.2} ({:?})",
            report.composite_score, report.composite_status
        );
        Ok(report)
    }

    fn score_queue(&self) -> EngineResult<DomainHealth> {
        let counters = self.storage.with_read(|conn| {
            job_ops::queue_counters(conn, Duration::minutes(STALE_LEASE_MINUTES))
        })?;

        let dead_rate = if counters.finished_last_24h == 0 {
            0.0
        } else {
            counters.dead_last_24h as f64 / counters.finished_last_24h as f64
        };
        let age_secs = counters.oldest_pending_age_secs.unwrap_or(0).max(0) as f64;

        let mut score = 1.0;
        score -= (counters.pending as f64 / 500.0).min(0.3);
        score -= (age_secs / 3600.0 * 0.3).min(0.3);
        score -= (dead_rate * 10.0).min(0.4);
        score -= (counters.stale_leases as f64 * 0.1).min(0.3);

        Ok(DomainHealth::new(HealthDomain::Queue, score)
            .signal("pending", counters.pending)
            .signal("oldest_pending_age_secs", age_secs as i64)
            .signal("dead_rate_24h", format!("{dead_rate:.4}"))
            .signal("stale_leases", counters.stale_leases))
    }

    fn score_storage(&self) -> EngineResult<DomainHealth> {
        let counters = self
            .storage
            .with_read(stats_ops::storage_counters)?;
        let ratio = counters.tombstone_ratio();

        // Full marks up to 10% tombstones, zero at 60%.
        let score = if ratio <= 0.1 {
            1.0
        } else {
            1.0 - ((ratio - 0.1) / 0.5).min(1.0)
        };

        Ok(DomainHealth::new(HealthDomain::Storage, score)
            .signal("total_memories", counters.total_memories)
            .signal("tombstones", counters.tombstones)
            .signal("tombstone_ratio", format!("{ratio:.3}")))
    }

    fn score_index(&self) -> EngineResult<DomainHealth> {
        let (fts_rows, active) = self.storage.with_read(fts::parity_counts)?;
        let (_, covered) = self.storage.with_read(embedding_ops::coverage_counts)?;

        let fts_ratio = if active == 0 {
            1.0
        } else {
            fts_rows as f64 / active as f64
        };
        // Ratios above 1.1 signal tombstone drift; below 1.0 signal
        // missing rows. Both degrade.
        let fts_score = if (0.999..=1.1).contains(&fts_ratio) {
            1.0
        } else if fts_ratio > 1.1 {
            (1.0 - (fts_ratio - 1.1)).max(0.0)
        } else {
            fts_ratio
        };

        let coverage = if active == 0 {
            1.0
        } else {
            covered as f64 / active as f64
        };

        let score = 0.5 * fts_score + 0.5 * coverage;
        Ok(DomainHealth::new(HealthDomain::Index, score)
            .signal("fts_rows", fts_rows)
            .signal("active_memories", active)
            .signal("fts_ratio", format!("{fts_ratio:.3}"))
            .signal("embedding_coverage", format!("{coverage:.3}")))
    }

    fn score_provider(&self) -> DomainHealth {
        let stats = self
            .tracker
            .lock()
            .map(|t| t.stats())
            .unwrap_or_default();
        // Timeouts hurt more than plain failures: they stall a worker
        // for the full timeout window.
        let total = stats.total();
        let score = if total == 0 {
            1.0
        } else {
            let weighted_bad = f64::from(stats.failures) + 1.5 * f64::from(stats.timeouts);
            (1.0 - weighted_bad / f64::from(total)).max(0.0)
        };
        DomainHealth::new(HealthDomain::Provider, score)
            .signal("window", total)
            .signal("successes", stats.successes)
            .signal("failures", stats.failures)
            .signal("timeouts", stats.timeouts)
    }

    fn score_mutation(&self) -> EngineResult<DomainHealth> {
        let (deletes, recovers) = self.storage.with_read(|conn| {
            let deletes = history_ops::count_events_since_days(conn, HistoryEvent::Deleted, 7)?;
            let recovers = history_ops::count_events_since_days(conn, HistoryEvent::Recovered, 7)?;
            Ok((deletes, recovers))
        })?;

        // Recovers are corrections of bad deletes: each one costs more
        // than the delete it undoes.
        let churn = deletes as f64 + 2.0 * recovers as f64;
        let score = (1.0 - churn / 200.0).max(0.0);

        Ok(DomainHealth::new(HealthDomain::Mutation, score)
            .signal("deletes_7d", deletes)
            .signal("recovers_7d", recovers))
    }

    fn score_connector(&self) -> EngineResult<DomainHealth> {
        let counters = self.storage.with_read(connector_ops::connector_counters)?;
        let score = if counters.total == 0 {
            1.0
        } else {
            let error_fraction = counters.errored as f64 / counters.total as f64;
            let age_penalty = counters
                .oldest_error_age_secs
                .map(|s| (s as f64 / 86_400.0 * 0.2).min(0.2))
                .unwrap_or(0.0);
            (1.0 - error_fraction - age_penalty).max(0.0)
        };

        Ok(DomainHealth::new(HealthDomain::Connector, score)
            .signal("connectors", counters.total)
            .signal("syncing", counters.syncing)
            .signal("errored", counters.errored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_tracker::{ProviderOutcome, ProviderTracker};

    fn fixture() -> Diagnostics {
        let storage = Arc::new(StorageEngine::open_in_memory().expect("in-memory engine"));
        Diagnostics::new(storage, ProviderTracker::shared(100))
    }

    #[test]
    fn test_empty_store_is_healthy() {
        let report = fixture().run().unwrap();
        assert!(report.composite_score > 0.9, "score {}", report.composite_score);
        assert_eq!(report.domains.len(), 6);
    }

    #[test]
    fn test_provider_failures_degrade() {
        let diagnostics = fixture();
        {
            let mut tracker = diagnostics.tracker.lock().unwrap();
            for _ in 0..60 {
                tracker.record(ProviderOutcome::Failure);
            }
            for _ in 0..40 {
                tracker.record(ProviderOutcome::Success);
            }
        }
        let report = diagnostics.run().unwrap();
        let provider = report.domain(HealthDomain::Provider).unwrap();
        assert!(provider.score < 0.5, "score {}", provider.score);
    }

    #[test]
    fn test_composite_weights_sum_to_one() {
        let total: f64 = [
            HealthDomain::Queue,
            HealthDomain::Storage,
            HealthDomain::Index,
            HealthDomain::Provider,
            HealthDomain::Mutation,
            HealthDomain::Connector,
        ]
        .iter()
        .map(|d| d.weight())
        .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
