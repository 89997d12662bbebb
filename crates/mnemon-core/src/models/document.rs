//! Chunkable source envelope for the document pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document ingest state machine:
/// queued → extracting → chunking → embedding → indexing → done | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Extracting,
    Chunking,
    Embedding,
    Indexing,
    Done,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "extracting" => Self::Extracting,
            "chunking" => Self::Chunking,
            "embedding" => Self::Embedding,
            "indexing" => Self::Indexing,
            "done" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Queued,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_url: Option<String>,
    pub source_type: String,
    pub title: Option<String>,
    pub raw_content: String,
    pub status: DocumentStatus,
    pub chunk_count: u32,
    pub memory_count: u32,
    pub connector_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(source_type: impl Into<String>, raw_content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_url: None,
            source_type: source_type.into(),
            title: None,
            raw_content: raw_content.into(),
            status: DocumentStatus::Queued,
            chunk_count: 0,
            memory_count: 0,
            connector_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Link from a document to a memory derived from one of its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMemory {
    pub document_id: String,
    pub memory_id: String,
    pub chunk_index: u32,
}
