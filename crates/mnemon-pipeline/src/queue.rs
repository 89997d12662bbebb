//! The durable job queue and the poll-delay backoff workers share.
//!
//! All queue state lives in `memory_jobs`; this type only chooses the
//! transaction scope. Lease operations run inside `with_write_tx`; LLM
//! work always happens after the lease transaction commits.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use mnemon_core::errors::EngineResult;
use mnemon_core::models::{Job, JobStatus, JobType};
use mnemon_storage::queries::job_ops;
use mnemon_storage::StorageEngine;

#[derive(Clone)]
pub struct JobQueue {
    storage: Arc<StorageEngine>,
}

impl JobQueue {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Queue an extraction for a source memory. No-op when a pending or
    /// leased job already covers it.
    pub fn enqueue_extract(&self, memory_id: &str, max_attempts: u32) -> EngineResult<bool> {
        let mut job = Job::new(JobType::Extract, Some(memory_id.to_string()), None);
        job.max_attempts = max_attempts;
        let inserted = self.storage.with_write_tx(|conn| job_ops::enqueue(conn, &job))?;
        if inserted {
            debug!("enqueued extract job for memory {memory_id}");
        }
        Ok(inserted)
    }

    pub fn enqueue_document(&self, document_id: &str, max_attempts: u32) -> EngineResult<bool> {
        let mut job = Job::new(JobType::DocumentIngest, None, Some(document_id.to_string()));
        job.max_attempts = max_attempts;
        let inserted = self.storage.with_write_tx(|conn| job_ops::enqueue(conn, &job))?;
        Ok(inserted)
    }

    /// One summary job per session-end; the document id carries the
    /// session document.
    pub fn enqueue_summary(&self, document_id: &str, max_attempts: u32) -> EngineResult<bool> {
        let mut job = Job::new(JobType::Summary, None, Some(document_id.to_string()));
        job.max_attempts = max_attempts;
        let inserted = self.storage.with_write_tx(|conn| job_ops::enqueue(conn, &job))?;
        Ok(inserted)
    }

    /// Lease the oldest pending job of a type, FIFO by `created_at`.
    pub fn lease(&self, job_type: JobType, max_attempts: u32) -> EngineResult<Option<Job>> {
        let job = self
            .storage
            .with_write_tx(|conn| job_ops::lease(conn, job_type, max_attempts))?;
        Ok(job)
    }

    pub fn complete(&self, job: &Job, result: Option<serde_json::Value>) -> EngineResult<()> {
        self.storage
            .with_write_tx(|conn| job_ops::complete(conn, &job.id, result.as_ref()))?;
        Ok(())
    }

    /// Record a failed attempt: pending again while attempts remain,
    /// dead otherwise. Returns the resulting status.
    pub fn fail(&self, job: &Job, error: &str, max_attempts: u32) -> EngineResult<JobStatus> {
        let status = self
            .storage
            .with_write_tx(|conn| job_ops::fail(conn, &job.id, error, max_attempts))?;
        Ok(status)
    }

    /// Return stale leases to pending. Runs on the maintenance cadence.
    pub fn reap_stale(&self, timeout: Duration) -> EngineResult<usize> {
        let timeout = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let count = self
            .storage
            .with_write_tx(|conn| job_ops::reap_stale_leases(conn, timeout))?;
        Ok(count)
    }
}

/// Exponential poll backoff with jitter: doubles per consecutive
/// failure, capped, reset on success.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            cap: Duration::from_secs(30),
            current: base,
        }
    }

    pub fn on_success(&mut self) {
        self.current = self.base;
    }

    pub fn on_failure(&mut self) {
        self.current = (self.current * 2).min(self.cap);
    }

    /// The next delay to sleep, with up to 500ms of jitter.
    pub fn next_delay(&self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..500);
        self.current + Duration::from_millis(jitter)
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(2));
        assert_eq!(backoff.current(), Duration::from_secs(2));
        backoff.on_failure();
        assert_eq!(backoff.current(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.on_failure();
        }
        assert_eq!(backoff.current(), Duration::from_secs(30));
        backoff.on_success();
        assert_eq!(backoff.current(), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_bounded() {
        let backoff = Backoff::new(Duration::from_secs(2));
        for _ in 0..50 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_millis(2500));
        }
    }
}
