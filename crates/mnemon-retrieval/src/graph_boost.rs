//! Knowledge-graph boost: query tokens → entities → one-hop neighbors →
//! linked memories, all bounded by fan-out caps and a wall-clock
//! deadline. Returns whatever it has when the deadline expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mnemon_core::config::RecallConfig;
use mnemon_core::errors::EngineResult;
use mnemon_storage::{queries::graph_ops, StorageEngine};

pub struct GraphBoost {
    deadline: Duration,
    max_neighbors: usize,
    max_linked_memories: usize,
}

#[derive(Debug, Default)]
pub struct GraphBoostOutcome {
    /// memory id → number of query-connected entities mentioning it.
    pub hits: HashMap<String, u32>,
    pub timed_out: bool,
}

impl GraphBoost {
    pub fn new(config: &RecallConfig) -> Self {
        Self {
            deadline: Duration::from_millis(config.graph_deadline_ms),
            max_neighbors: config.graph_max_neighbors,
            max_linked_memories: config.graph_max_linked_memories,
        }
    }

    pub fn run(&self, storage: &StorageEngine, query: &str) -> EngineResult<GraphBoostOutcome> {
        let started = Instant::now();
        let mut outcome = GraphBoostOutcome::default();

        let tokens: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            return Ok(outcome);
        }

        // Seed entities by token, then expand one hop in both directions.
        let mut entity_ids: Vec<String> = Vec::new();
        for token in &tokens {
            if started.elapsed() >= self.deadline {
                outcome.timed_out = true;
                return Ok(outcome);
            }
            let matched = storage.with_read(|conn| {
                graph_ops::entities_matching_token(conn, token, self.max_neighbors)
            })?;
            for id in matched {
                if !entity_ids.contains(&id) {
                    entity_ids.push(id);
                }
            }
        }

        let seeds = entity_ids.clone();
        for entity_id in &seeds {
            if started.elapsed() >= self.deadline || entity_ids.len() >= self.max_neighbors {
                outcome.timed_out = started.elapsed() >= self.deadline;
                break;
            }
            let neighbors = storage.with_read(|conn| {
                graph_ops::one_hop_neighbors(conn, entity_id, self.max_neighbors)
            })?;
            for id in neighbors {
                if !entity_ids.contains(&id) && entity_ids.len() < self.max_neighbors {
                    entity_ids.push(id);
                }
            }
        }

        // Collect linked memories, bounded overall.
        let mut linked_total = 0usize;
        for entity_id in &entity_ids {
            if started.elapsed() >= self.deadline {
                outcome.timed_out = true;
                break;
            }
            if linked_total >= self.max_linked_memories {
                break;
            }
            let remaining = self.max_linked_memories - linked_total;
            let memory_ids = storage.with_read(|conn| {
                graph_ops::memories_mentioning(conn, entity_id, remaining)
            })?;
            linked_total += memory_ids.len();
            for memory_id in memory_ids {
                *outcome.hits.entry(memory_id).or_insert(0) += 1;
            }
        }

        Ok(outcome)
    }
}
