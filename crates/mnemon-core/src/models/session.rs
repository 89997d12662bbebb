//! Session feedback rows used by the summary worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A memory injected into a session, ranked at injection time; the
/// continuity-scoring pass writes `relevance` back after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMemory {
    pub session_key: String,
    pub memory_id: String,
    pub rank: u32,
    pub relevance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScore {
    pub session_key: String,
    pub score: f64,
    pub rationale: Option<String>,
    pub created_at: DateTime<Utc>,
}
