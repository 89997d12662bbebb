//! Cooperative worker lifecycle.
//!
//! A worker is an infinite loop with one await point per tick. The
//! handle stops it by flipping the running flag and waking the sleep;
//! `stop()` resolves only after the in-flight tick completes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mnemon_core::errors::EngineResult;

use crate::queue::Backoff;

/// Whether a tick did useful work, found nothing, or failed. Idle ticks
/// keep the base delay; failures back off.
pub enum Tick {
    Worked,
    Idle,
}

pub struct WorkerHandle {
    name: &'static str,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker loop. `tick` runs once per poll; consecutive
    /// failures double the delay (capped, jittered), success resets it.
    pub fn spawn<F, Fut>(name: &'static str, base_delay: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = EngineResult<Tick>> + Send,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stop_signal = Arc::new(Notify::new());

        let loop_running = Arc::clone(&running);
        let loop_signal = Arc::clone(&stop_signal);
        let join = tokio::spawn(async move {
            let mut backoff = Backoff::new(base_delay);
            debug!("{name} worker started");
            while loop_running.load(Ordering::Acquire) {
                match tick().await {
                    Ok(Tick::Worked) => {
                        backoff.on_success();
                        // Drain the queue promptly: no sleep after work.
                        continue;
                    }
                    Ok(Tick::Idle) => backoff.on_success(),
                    Err(e) => {
                        warn!("{name} worker tick failed: {e}");
                        backoff.on_failure();
                    }
                }

                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = loop_signal.notified() => {}
                }
            }
            debug!("{name} worker stopped");
        });

        Self {
            name,
            running,
            stop_signal,
            join: Some(join),
        }
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cooperative stop: prevent new ticks, wake the sleeper, await the
    /// in-flight tick.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.stop_signal.notify_waiters();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!("{} worker join failed: {e}", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_ticks_then_stops() {
        let count = Arc::new(AtomicU32::new(0));
        let tick_count = Arc::clone(&count);
        let mut handle = WorkerHandle::spawn("test", Duration::from_millis(5), move || {
            let tick_count = Arc::clone(&tick_count);
            async move {
                tick_count.fetch_add(1, Ordering::SeqCst);
                Ok(Tick::Idle)
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(handle.running());
        handle.stop().await;
        assert!(!handle.running());

        let at_stop = count.load(Ordering::SeqCst);
        assert!(at_stop >= 2, "ticked {at_stop} times");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop, "ticked after stop");
    }

    #[tokio::test]
    async fn test_stop_waits_for_inflight_tick() {
        let finished = Arc::new(AtomicBool::new(false));
        let tick_finished = Arc::clone(&finished);
        let mut handle = WorkerHandle::spawn("slow", Duration::from_millis(5), move || {
            let tick_finished = Arc::clone(&tick_finished);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                tick_finished.store(true, Ordering::SeqCst);
                Ok(Tick::Idle)
            }
        });

        // Let the first tick start, then stop mid-tick.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop().await;
        assert!(finished.load(Ordering::SeqCst), "stop resolved mid-tick");
    }
}
