//! Normalized parser output. Every source parser produces this shape;
//! the chunker consumes nothing else.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Code,
    Table,
    List,
    Blockquote,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Table => "table",
            Self::List => "list",
            Self::Blockquote => "blockquote",
        }
    }
}

/// One structural unit of a parsed document. A section never mixes
/// content types.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParsedSection {
    pub heading: Option<String>,
    pub depth: u8,
    pub content: String,
    pub content_type: ContentType,
    pub language: Option<String>,
    pub page: Option<u32>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub format: String,
    pub title: Option<String>,
    pub sections: Vec<ParsedSection>,
    pub metadata: HashMap<String, String>,
    pub total_chars: usize,
}

impl ParsedDocument {
    pub fn new(format: impl Into<String>, sections: Vec<ParsedSection>) -> Self {
        let total_chars = sections.iter().map(|s| s.content.len()).sum();
        Self {
            format: format.into(),
            title: None,
            sections,
            metadata: HashMap::new(),
            total_chars,
        }
    }
}
