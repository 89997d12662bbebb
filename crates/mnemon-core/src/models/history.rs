//! Append-only audit trail. Shadow-mode decisions land here as
//! `event = none` with `metadata.shadow = true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEvent {
    Created,
    Updated,
    Deleted,
    Recovered,
    None,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Recovered => "recovered",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            "recovered" => Self::Recovered,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub memory_id: String,
    pub event: HistoryEvent,
    pub new_content: Option<String>,
    pub changed_by: String,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(memory_id: impl Into<String>, event: HistoryEvent, changed_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            memory_id: memory_id.into(),
            event,
            new_content: None,
            changed_by: changed_by.into(),
            reason: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_new_content(mut self, content: impl Into<String>) -> Self {
        self.new_content = Some(content.into());
        self
    }
}
