//! Retention worker: periodic sweep of tombstones past the horizon,
//! cascading their index rows. Pinned memories never qualify.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use mnemon_core::config::RetentionConfig;
use mnemon_core::errors::EngineResult;
use mnemon_storage::queries::memory_crud;
use mnemon_storage::StorageEngine;

use crate::workers::handle::{Tick, WorkerHandle};

pub struct RetentionWorker {
    storage: Arc<StorageEngine>,
    config: RetentionConfig,
}

impl RetentionWorker {
    pub fn start(storage: Arc<StorageEngine>, config: RetentionConfig) -> WorkerHandle {
        let interval = Duration::from_millis(config.sweep_interval_ms);
        let worker = Arc::new(Self { storage, config });
        WorkerHandle::spawn("retention", interval, move || {
            let worker = Arc::clone(&worker);
            async move { worker.tick() }
        })
    }

    fn tick(&self) -> EngineResult<Tick> {
        let purged = sweep_once(&self.storage, &self.config)?;
        if purged == 0 {
            Ok(Tick::Idle)
        } else {
            Ok(Tick::Worked)
        }
    }
}

/// One bounded sweep batch. Shared with the maintenance repair action.
pub fn sweep_once(storage: &StorageEngine, config: &RetentionConfig) -> EngineResult<usize> {
    let cutoff = Utc::now() - chrono::Duration::days(config.tombstone_horizon_days);
    let batch = config.sweep_batch_size;

    let purged = storage.with_write_tx(|conn| {
        let expired = memory_crud::expired_tombstones(conn, cutoff, batch)?;
        for memory in &expired {
            memory_crud::purge_tombstone(conn, memory)?;
        }
        Ok(expired.len())
    })?;

    if purged > 0 {
        info!("retention sweep purged {purged} tombstones");
    }
    Ok(purged)
}
