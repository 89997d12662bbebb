//! The atomic unit of knowledge, plus the normalization used for dedup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of knowledge a memory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Decision,
    Rationale,
    Preference,
    Procedural,
    Semantic,
    System,
    Skill,
    DocumentChunk,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Decision => "decision",
            Self::Rationale => "rationale",
            Self::Preference => "preference",
            Self::Procedural => "procedural",
            Self::Semantic => "semantic",
            Self::System => "system",
            Self::Skill => "skill",
            Self::DocumentChunk => "document_chunk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(Self::Fact),
            "decision" => Some(Self::Decision),
            "rationale" => Some(Self::Rationale),
            "preference" => Some(Self::Preference),
            "procedural" => Some(Self::Procedural),
            "semantic" => Some(Self::Semantic),
            "system" => Some(Self::System),
            "skill" => Some(Self::Skill),
            "document_chunk" => Some(Self::DocumentChunk),
            _ => None,
        }
    }
}

/// Where a memory stands in the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    #[default]
    None,
    Pending,
    Completed,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::None,
        }
    }
}

/// An atomic, durable knowledge item.
///
/// Invariants:
/// - exactly one non-deleted memory per `content_hash`
/// - `is_deleted` implies `deleted_at` is set
/// - pinned memories are never auto-deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub normalized_content: String,
    pub content_hash: String,
    pub memory_type: MemoryType,
    pub confidence: f64,
    pub importance: f64,
    pub pinned: bool,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub source_path: Option<String>,
    pub source_section: Option<String>,
    pub extraction_status: ExtractionStatus,
    pub extraction_model: Option<String>,
    pub embedding_model: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reserved for future merge logic.
    #[serde(default)]
    pub vector_clock: HashMap<String, i64>,
}

impl Memory {
    /// Build a new memory, deriving `normalized_content` and `content_hash`.
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        let content = content.into();
        let normalized = normalize_content(&content);
        let hash = compute_content_hash(&normalized);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            normalized_content: normalized,
            content_hash: hash,
            memory_type,
            confidence: 1.0,
            importance: 0.5,
            pinned: false,
            source_type: None,
            source_id: None,
            source_path: None,
            source_section: None,
            extraction_status: ExtractionStatus::None,
            extraction_model: None,
            embedding_model: None,
            is_deleted: false,
            deleted_at: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
            vector_clock: HashMap::new(),
        }
    }

    /// Replace the content, re-deriving the normalized form and hash.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.normalized_content = normalize_content(&self.content);
        self.content_hash = compute_content_hash(&self.normalized_content);
        self.updated_at = Utc::now();
    }
}

/// Casefold, strip punctuation, and collapse whitespace.
///
/// Two statements that differ only in casing, punctuation, or spacing
/// normalize to the same string and therefore the same hash.
pub fn normalize_content(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last_was_space = true;
    for ch in content.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if ch.is_whitespace() || ch.is_ascii_punctuation() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        // Other symbols (emoji etc.) are dropped outright.
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Hash of the normalized content, hex-encoded.
pub fn compute_content_hash(normalized: &str) -> String {
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_case_punctuation_whitespace() {
        assert_eq!(
            normalize_content("User  prefers DARK mode!"),
            "user prefers dark mode"
        );
        assert_eq!(
            normalize_content("user, prefers; dark... mode"),
            "user prefers dark mode"
        );
    }

    #[test]
    fn test_equal_hash_for_equivalent_content() {
        let a = Memory::new("Uses Postgres 16.", MemoryType::Fact);
        let b = Memory::new("uses   postgres 16", MemoryType::Fact);
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_set_content_rederives_hash() {
        let mut m = Memory::new("old", MemoryType::Fact);
        let before = m.content_hash.clone();
        m.set_content("new content");
        assert_ne!(m.content_hash, before);
        assert_eq!(m.normalized_content, "new content");
    }
}
