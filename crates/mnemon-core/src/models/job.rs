//! Durable queue rows. Lifecycle: pending → leased → completed,
//! or failed → pending while attempts remain, else dead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Extract,
    DocumentIngest,
    Summary,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::DocumentIngest => "document_ingest",
            Self::Summary => "summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extract" => Some(Self::Extract),
            "document_ingest" => Some(Self::DocumentIngest),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Leased,
    Completed,
    Failed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Leased => "leased",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "leased" => Some(Self::Leased),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// A queued unit of work. At most one pending-or-leased job exists per
/// `(memory_id | document_id, job_type)` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub memory_id: Option<String>,
    pub document_id: Option<String>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub leased_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl Job {
    pub fn new(job_type: JobType, memory_id: Option<String>, document_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            memory_id,
            document_id,
            job_type,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            leased_at: None,
            created_at: now,
            updated_at: now,
            error: None,
            result: None,
        }
    }

    /// The dedup key: memory id for extract jobs, document id otherwise.
    pub fn key(&self) -> Option<&str> {
        self.memory_id
            .as_deref()
            .or(self.document_id.as_deref())
    }
}
