//! Decision-engine output and the per-job write accounting attached to
//! completed jobs.

use serde::{Deserialize, Serialize};

use super::{ExtractedItem, ExtractedRelation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalAction {
    Add,
    Update,
    Delete,
    None,
}

impl ProposalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::None => "none",
        }
    }
}

/// The action chosen for one extracted item given the current store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub action: ProposalAction,
    pub target_id: Option<String>,
    pub confidence: f64,
    pub reason: String,
}

impl Proposal {
    pub fn add(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action: ProposalAction::Add,
            target_id: None,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            action: ProposalAction::None,
            target_id: None,
            confidence: 0.0,
            reason: reason.into(),
        }
    }
}

/// Counters accumulated while applying (or shadowing) proposals.
/// Serialized into the job result with the wire field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    #[serde(rename = "added")]
    pub added: u32,
    #[serde(rename = "updated")]
    pub updated: u32,
    #[serde(rename = "deleted")]
    pub deleted: u32,
    #[serde(rename = "deduped")]
    pub deduped: u32,
    #[serde(rename = "blockedDestructive")]
    pub blocked_destructive: u32,
    #[serde(rename = "skippedLowConfidence")]
    pub skipped_low_confidence: u32,
    #[serde(rename = "embeddingsAdded")]
    pub embeddings_added: u32,
    #[serde(rename = "reviewNeeded")]
    pub review_needed: u32,
}

/// JSON payload written to a completed extraction job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub facts: Vec<ExtractedItem>,
    pub entities: Vec<ExtractedRelation>,
    pub proposals: Vec<Proposal>,
    pub warnings: Vec<String>,
    #[serde(rename = "writeMode")]
    pub write_mode: String,
    #[serde(rename = "writeStats")]
    pub write_stats: WriteStats,
}

impl JobReport {
    pub fn new(write_mode: impl Into<String>) -> Self {
        Self {
            facts: Vec::new(),
            entities: Vec::new(),
            proposals: Vec::new(),
            warnings: Vec::new(),
            write_mode: write_mode.into(),
            write_stats: WriteStats::default(),
        }
    }
}
