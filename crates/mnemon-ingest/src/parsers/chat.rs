//! Chat export parser (Slack/Discord-shaped JSON).
//!
//! Noise subtypes are dropped, messages are grouped into threads first
//! by explicit reply pointers and then by a 30-minute time-gap
//! heuristic, and each thread renders as one section of
//! `[HH:MM] speaker: text` lines.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use mnemon_core::errors::ParseError;
use mnemon_core::models::{ContentType, ParsedDocument, ParsedSection};
use mnemon_core::traits::DocumentParser;

pub struct ChatExportParser;

const THREAD_GAP_MINUTES: i64 = 30;

const NOISE_SUBTYPES: &[&str] = &[
    "channel_join",
    "channel_leave",
    "group_join",
    "group_leave",
    "pinned_item",
    "unpinned_item",
    "bot_message",
];

#[derive(Debug, Deserialize)]
struct Export {
    #[serde(default)]
    channel: Option<String>,
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    ts: serde_json::Value,
    #[serde(default, alias = "author")]
    user: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    thread_ts: Option<serde_json::Value>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Message {
    at: DateTime<Utc>,
    speaker: String,
    text: String,
    thread_key: Option<String>,
    ts_key: String,
}

/// Slack exports carry "1712345678.000200"-style second timestamps;
/// Discord exports carry RFC3339 strings. Accept both.
fn parse_ts(value: &serde_json::Value) -> Option<(DateTime<Utc>, String)> {
    match value {
        serde_json::Value::String(s) => {
            if let Ok(secs) = s.parse::<f64>() {
                let at = Utc.timestamp_opt(secs as i64, 0).single()?;
                Some((at, s.clone()))
            } else {
                let at = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
                Some((at, s.clone()))
            }
        }
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            let at = Utc.timestamp_opt(secs as i64, 0).single()?;
            Some((at, n.to_string()))
        }
        _ => None,
    }
}

fn is_noise(raw: &RawMessage) -> bool {
    if raw.text.trim().is_empty() {
        return true;
    }
    if raw.user.is_none() && raw.bot_id.is_some() {
        return true;
    }
    raw.subtype
        .as_deref()
        .is_some_and(|s| NOISE_SUBTYPES.contains(&s))
}

impl DocumentParser for ChatExportParser {
    fn format(&self) -> &'static str {
        "chat"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument, ParseError> {
        let export: Export = serde_json::from_str(source)?;

        let mut messages: Vec<Message> = Vec::new();
        for raw in &export.messages {
            if is_noise(raw) {
                continue;
            }
            let Some((at, ts_key)) = parse_ts(&raw.ts) else {
                continue;
            };
            let thread_key = raw
                .thread_ts
                .as_ref()
                .and_then(parse_ts)
                .map(|(_, key)| key)
                // A thread root points at itself; that is not a reply.
                .filter(|key| *key != ts_key);
            messages.push(Message {
                at,
                speaker: raw.user.clone().unwrap_or_else(|| "unknown".to_string()),
                text: raw.text.clone(),
                thread_key,
                ts_key,
            });
        }
        messages.sort_by(|a, b| a.at.cmp(&b.at).then(a.ts_key.cmp(&b.ts_key)));

        // Pass 1: explicit threads. Roots claim their replies.
        let mut threads: BTreeMap<String, Vec<Message>> = BTreeMap::new();
        let mut loose: Vec<Message> = Vec::new();
        for msg in messages {
            match &msg.thread_key {
                Some(root) => threads.entry(root.clone()).or_default().push(msg),
                None => {
                    // A root whose replies were seen first claims its slot.
                    if let Some(thread) = threads.get_mut(&msg.ts_key) {
                        thread.insert(0, msg);
                    } else {
                        loose.push(msg);
                    }
                }
            }
        }
        // Roots that sorted after a reply: move them in front.
        loose.retain(|msg| {
            if let Some(thread) = threads.get_mut(&msg.ts_key) {
                thread.insert(0, msg.clone());
                false
            } else {
                true
            }
        });

        // Pass 2: batch the remaining messages by time gap.
        let mut batches: Vec<Vec<Message>> = Vec::new();
        for msg in loose {
            let start_new = batches
                .last()
                .and_then(|b| b.last())
                .map_or(true, |last| {
                    (msg.at - last.at).num_minutes() >= THREAD_GAP_MINUTES
                });
            if start_new {
                batches.push(vec![msg]);
            } else if let Some(batch) = batches.last_mut() {
                batch.push(msg);
            }
        }

        let mut groups: Vec<(DateTime<Utc>, Vec<Message>)> = threads
            .into_values()
            .chain(batches)
            .filter(|g| !g.is_empty())
            .map(|g| (g[0].at, g))
            .collect();
        groups.sort_by_key(|(at, _)| *at);

        let sections = groups
            .into_iter()
            .map(|(at, group)| {
                let rendered: Vec<String> = group
                    .iter()
                    .map(|m| format!("[{}] {}: {}", m.at.format("%H:%M"), m.speaker, m.text))
                    .collect();
                ParsedSection {
                    heading: Some(format!("Conversation {}", at.format("%Y-%m-%d %H:%M"))),
                    depth: 2,
                    content: rendered.join("\n"),
                    content_type: ContentType::Text,
                    language: None,
                    page: None,
                    line_start: None,
                    line_end: None,
                }
            })
            .collect();

        let mut doc = ParsedDocument::new("chat", sections);
        doc.title = export.channel;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: &str, user: &str, text: &str) -> serde_json::Value {
        serde_json::json!({"ts": ts, "user": user, "text": text})
    }

    #[test]
    fn test_noise_filtered() {
        let export = serde_json::json!({
            "messages": [
                {"ts": "1700000000.0", "user": "a", "text": "joined", "subtype": "channel_join"},
                {"ts": "1700000010.0", "bot_id": "B1", "text": "beep"},
                msg("1700000020.0", "alice", "real message"),
            ]
        });
        let doc = ChatExportParser.parse(&export.to_string()).unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].content.contains("alice: real message"));
        assert!(!doc.sections[0].content.contains("joined"));
    }

    #[test]
    fn test_explicit_thread_grouping() {
        let export = serde_json::json!({
            "messages": [
                msg("1700000000.0", "alice", "root question"),
                {"ts": "1700010000.0", "user": "bob", "text": "threaded answer",
                 "thread_ts": "1700000000.0"},
                msg("1700000060.0", "carol", "unrelated"),
            ]
        });
        let doc = ChatExportParser.parse(&export.to_string()).unwrap();
        // Root + reply in one section despite the big time gap.
        let threaded = doc
            .sections
            .iter()
            .find(|s| s.content.contains("root question"))
            .unwrap();
        assert!(threaded.content.contains("threaded answer"));
        assert!(!threaded.content.contains("unrelated"));
    }

    #[test]
    fn test_gap_batching() {
        let export = serde_json::json!({
            "messages": [
                msg("1700000000.0", "a", "first"),
                msg("1700000300.0", "b", "second, five minutes later"),
                msg("1700010000.0", "c", "much later"),
            ]
        });
        let doc = ChatExportParser.parse(&export.to_string()).unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert!(doc.sections[0].content.contains("first"));
        assert!(doc.sections[0].content.contains("second"));
        assert!(doc.sections[1].content.contains("much later"));
    }

    #[test]
    fn test_renders_time_speaker_lines() {
        let export = serde_json::json!({"messages": [msg("1700000000.0", "alice", "hi")]});
        let doc = ChatExportParser.parse(&export.to_string()).unwrap();
        let line = doc.sections[0].content.lines().next().unwrap();
        assert!(line.starts_with('['), "line: {line}");
        assert!(line.contains("] alice: hi"));
    }
}
