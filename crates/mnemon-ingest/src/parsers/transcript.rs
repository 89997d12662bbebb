//! Session transcript parser.
//!
//! The connector has already materialized the session from its VCS side
//! branch (metadata, prompt, context, and a JSONL transcript, possibly
//! chunked); this parser renders assistant turns, user turns, and tool
//! invocations into readable prose under a hard character cap.

use serde::Deserialize;

use mnemon_core::errors::ParseError;
use mnemon_core::models::{ContentType, ParsedDocument, ParsedSection};
use mnemon_core::traits::DocumentParser;

pub struct TranscriptParser {
    char_cap: usize,
}

impl Default for TranscriptParser {
    fn default() -> Self {
        Self { char_cap: 200_000 }
    }
}

impl TranscriptParser {
    pub fn with_char_cap(char_cap: usize) -> Self {
        Self { char_cap }
    }
}

#[derive(Debug, Deserialize)]
struct SessionDump {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    context: Option<String>,
    /// JSONL: one turn object per line. Chunked sessions concatenate
    /// their parts in order.
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct Turn {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    tool_input: Option<serde_json::Value>,
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Object(map) => map
            .get("text")
            .map(value_to_text)
            .unwrap_or_default(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_turn(turn: &Turn) -> Option<String> {
    if let Some(tool) = &turn.tool {
        let input = turn
            .tool_input
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap_or_default())
            .unwrap_or_default();
        let mut line = format!("Tool call: {tool}");
        if !input.is_empty() {
            line.push_str(&format!(" with {input}"));
        }
        return Some(line);
    }
    let text = value_to_text(&turn.content);
    if text.trim().is_empty() {
        return None;
    }
    match turn.role.as_str() {
        "assistant" => Some(format!("Assistant: {text}")),
        "user" | "human" => Some(format!("User: {text}")),
        other if !other.is_empty() => Some(format!("{other}: {text}")),
        _ => Some(text),
    }
}

impl DocumentParser for TranscriptParser {
    fn format(&self) -> &'static str {
        "transcript"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument, ParseError> {
        let dump: SessionDump = serde_json::from_str(source)?;
        let mut sections = Vec::new();

        if !dump.metadata.is_null() {
            let rendered = serde_json::to_string_pretty(&dump.metadata)?;
            sections.push(ParsedSection {
                heading: Some("Session metadata".to_string()),
                depth: 2,
                content: rendered,
                content_type: ContentType::Text,
                ..ParsedSection::default()
            });
        }
        if let Some(prompt) = &dump.prompt {
            if !prompt.trim().is_empty() {
                sections.push(ParsedSection {
                    heading: Some("Prompt".to_string()),
                    depth: 2,
                    content: prompt.clone(),
                    content_type: ContentType::Text,
                    ..ParsedSection::default()
                });
            }
        }
        if let Some(context) = &dump.context {
            if !context.trim().is_empty() {
                sections.push(ParsedSection {
                    heading: Some("Context".to_string()),
                    depth: 2,
                    content: context.clone(),
                    content_type: ContentType::Text,
                    ..ParsedSection::default()
                });
            }
        }

        let mut rendered_turns: Vec<String> = Vec::new();
        let mut used = 0usize;
        let mut truncated = false;
        for line in dump.transcript.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Tolerate malformed lines; a transcript is best-effort.
            let Ok(turn) = serde_json::from_str::<Turn>(trimmed) else {
                continue;
            };
            let Some(text) = render_turn(&turn) else { continue };
            if used + text.len() > self.char_cap {
                truncated = true;
                break;
            }
            used += text.len() + 1;
            rendered_turns.push(text);
        }
        if truncated {
            rendered_turns.push("[transcript truncated]".to_string());
        }
        if !rendered_turns.is_empty() {
            sections.push(ParsedSection {
                heading: Some("Transcript".to_string()),
                depth: 2,
                content: rendered_turns.join("\n\n"),
                content_type: ContentType::Text,
                ..ParsedSection::default()
            });
        }

        if sections.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut doc = ParsedDocument::new("transcript", sections);
        doc.title = dump.session_id;
        Ok(doc)
    }
}
