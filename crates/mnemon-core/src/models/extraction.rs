//! Typed output of an LLM extraction pass.

use serde::{Deserialize, Serialize};

use super::MemoryType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub content: String,
    pub item_type: MemoryType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub relationship: String,
    pub target: String,
    pub confidence: f64,
}

/// What an extraction produced. A failed LLM call yields an empty result
/// with a warning rather than an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub items: Vec<ExtractedItem>,
    pub relations: Vec<ExtractedRelation>,
    pub warnings: Vec<String>,
    pub usage: Option<TokenUsage>,
}

impl ExtractionResult {
    pub fn failed(warning: impl Into<String>) -> Self {
        Self {
            warnings: vec![warning.into()],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
    pub cost: f64,
    pub duration_ms: u64,
}

/// Text plus accounting, from providers that report usage.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}
