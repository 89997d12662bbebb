//! Source connector registrations and their sync cursors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    #[default]
    Idle,
    Syncing,
    Error,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "syncing" => Self::Syncing,
            "error" => Self::Error,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,
    pub provider: String,
    pub settings: serde_json::Value,
    pub cursor: serde_json::Value,
    pub status: ConnectorStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Connector {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            settings: serde_json::Value::Null,
            cursor: serde_json::Value::Null,
            status: ConnectorStatus::Idle,
            last_sync_at: None,
            last_error: None,
        }
    }
}
