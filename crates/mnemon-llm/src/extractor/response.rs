//! Shared response parser for all extractor flavors.
//!
//! Models wrap JSON in fences, prepend reasoning, leave trailing commas,
//! and embed raw newlines in strings. The parser strips, locates the
//! first balanced object, repairs, and validates — dropping bad items
//! with warnings instead of failing the extraction.

use serde_json::Value;

use mnemon_core::models::{ExtractedItem, ExtractedRelation, ExtractionResult};

use super::ExtractorFlavor;

pub fn parse_response(
    raw: &str,
    flavor: ExtractorFlavor,
    min_confidence: f64,
) -> ExtractionResult {
    let mut result = ExtractionResult::default();

    let stripped = strip_wrappers(raw);
    let Some(json_text) = extract_object(&stripped) else {
        result
            .warnings
            .push("no JSON object found in response".to_string());
        return result;
    };

    let value = match parse_with_repair(&json_text) {
        Some(v) => v,
        None => {
            result
                .warnings
                .push("response JSON unparseable after repair".to_string());
            return result;
        }
    };

    // Either `items` or `facts`; either `relations` or `entities`.
    let items = value
        .get("items")
        .or_else(|| value.get("facts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let relations = value
        .get("relations")
        .or_else(|| value.get("entities"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for (idx, item) in items.iter().enumerate() {
        match validate_item(item, flavor, min_confidence) {
            Ok(parsed) => result.items.push(parsed),
            Err(reason) => result.warnings.push(format!("item {idx} dropped: {reason}")),
        }
    }
    for (idx, relation) in relations.iter().enumerate() {
        match validate_relation(relation, min_confidence) {
            Ok(parsed) => result.relations.push(parsed),
            Err(reason) => result
                .warnings
                .push(format!("relation {idx} dropped: {reason}")),
        }
    }

    result
}

/// Remove markdown fences and `<think>`-style reasoning blocks.
fn strip_wrappers(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    // Reasoning blocks, possibly unclosed.
    for tag in ["think", "reasoning", "thinking"] {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        while let Some(start) = text.find(&open) {
            match text[start..].find(&close) {
                Some(rel_end) => {
                    text.replace_range(start..start + rel_end + close.len(), "");
                }
                None => {
                    text.truncate(start);
                    break;
                }
            }
        }
    }

    // Code fences: keep the inside.
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip an optional language tag on the opening fence line.
        let body = rest.split_once('\n').map_or("", |(_, b)| b);
        let inner = body.rsplit_once("```").map_or(body, |(b, _)| b);
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// First balanced `{…}` object, scanning with string/escape awareness.
/// Falls back to the first-`{` / last-`}` slice.
fn extract_object(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }

    // Unbalanced: fall back to the outermost slice.
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].to_string())
}

/// Parse, and on failure repair common faults (trailing commas, raw
/// newlines inside strings) and retry once.
fn parse_with_repair(json_text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(json_text) {
        return Some(v);
    }
    serde_json::from_str(&repair_json(json_text)).ok()
}

fn repair_json(json_text: &str) -> String {
    let mut out = String::with_capacity(json_text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = json_text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' | '\r' | '\t' if in_string => {
                // Raw control characters are illegal inside JSON strings.
                out.push_str(match c {
                    '\n' => "\\n",
                    '\r' => "\\r",
                    _ => "\\t",
                });
            }
            ',' if !in_string => {
                // Trailing comma: next non-whitespace is a closer.
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    continue;
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn validate_item(
    item: &Value,
    flavor: ExtractorFlavor,
    min_confidence: f64,
) -> Result<ExtractedItem, String> {
    let content = item
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if content.is_empty() {
        return Err("empty content".to_string());
    }
    if content.len() < flavor.min_item_len() {
        return Err(format!(
            "content shorter than {} chars",
            flavor.min_item_len()
        ));
    }

    let item_type = item
        .get("type")
        .and_then(Value::as_str)
        .and_then(|raw| flavor.resolve_type(raw))
        .unwrap_or_else(|| flavor.default_type());

    let confidence = item
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    if confidence < min_confidence {
        return Err(format!("confidence {confidence} below minimum"));
    }

    Ok(ExtractedItem {
        content: content.to_string(),
        item_type,
        confidence,
    })
}

fn validate_relation(
    relation: &Value,
    min_confidence: f64,
) -> Result<ExtractedRelation, String> {
    let field = |name: &str| -> Result<String, String> {
        relation
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("missing {name}"))
    };
    let source = field("source")?;
    let relationship = field("relationship").or_else(|_| field("type"))?;
    let target = field("target")?;

    let confidence = relation
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    if confidence < min_confidence {
        return Err(format!("confidence {confidence} below minimum"));
    }

    Ok(ExtractedRelation {
        source,
        relationship,
        target,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::models::MemoryType;

    const FLAVOR: ExtractorFlavor = ExtractorFlavor::Document;

    #[test]
    fn test_clean_json_parses() {
        let raw = r#"{"items":[{"content":"User prefers dark mode in the editor","type":"preference","confidence":0.9}],"relations":[]}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].item_type, MemoryType::Preference);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_fenced_json_parses() {
        let raw = "```json\n{\"items\": [{\"content\": \"The build uses cargo workspaces\", \"type\": \"fact\", \"confidence\": 0.8}], \"relations\": []}\n```";
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
    }

    #[test]
    fn test_reasoning_block_stripped() {
        let raw = "<think>let me consider what matters here</think>\n{\"items\": [{\"content\": \"Deploys happen every Friday morning\", \"confidence\": 0.7}], \"relations\": []}";
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
        // Unknown type falls back to the flavor default.
        assert_eq!(result.items[0].item_type, MemoryType::Fact);
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "Here is what I found:\n{\"items\": [{\"content\": \"The staging database lives on host db2\", \"type\": \"fact\", \"confidence\": 0.9}]}\nHope that helps!";
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let raw = r#"{"items": [{"content": "Tests run with cargo nextest always", "type": "fact", "confidence": 0.8},], "relations": [],}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
    }

    #[test]
    fn test_raw_newline_in_string_repaired() {
        let raw = "{\"items\": [{\"content\": \"Line one\nline two of the same fact\", \"type\": \"fact\", \"confidence\": 0.8}]}";
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
        assert!(result.items[0].content.contains("line two"));
    }

    #[test]
    fn test_facts_alias_accepted() {
        let raw = r#"{"facts": [{"content": "Rust edition 2021 is used everywhere", "type": "fact", "confidence": 0.9}], "entities": [{"source": "Rust", "relationship": "used_by", "target": "project", "confidence": 0.8}]}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.relations.len(), 1);
    }

    #[test]
    fn test_synonym_mapping() {
        let raw = r#"{"items": [
            {"content": "PATH must include the tools directory", "type": "configuration", "confidence": 0.9},
            {"content": "The team chose monorepo layout deliberately", "type": "architectural", "confidence": 0.9}
        ]}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items[0].item_type, MemoryType::System);
        assert_eq!(result.items[1].item_type, MemoryType::Decision);
    }

    #[test]
    fn test_low_confidence_and_short_items_dropped_with_warnings() {
        let raw = r#"{"items": [
            {"content": "solid durable fact about the deployment", "type": "fact", "confidence": 0.1},
            {"content": "short", "type": "fact", "confidence": 0.9},
            {"content": "", "type": "fact", "confidence": 0.9}
        ]}"#;
        let result = parse_response(raw, FLAVOR, 0.5);
        assert!(result.items.is_empty());
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_confidence_clamped() {
        let raw = r#"{"items": [{"content": "A fact with an overconfident score", "type": "fact", "confidence": 7.5}]}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items[0].confidence, 1.0);
    }

    #[test]
    fn test_garbage_yields_warning_not_error() {
        let result = parse_response("I could not find anything useful.", FLAVOR, 0.3);
        assert!(result.items.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_relation_requires_all_fields() {
        let raw = r#"{"items": [], "relations": [{"source": "A", "target": "B", "confidence": 0.9}]}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert!(result.relations.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let raw = r#"{"items": [{"content": "Use {braces} in the template literally", "type": "procedural", "confidence": 0.8}]}"#;
        let result = parse_response(raw, FLAVOR, 0.3);
        assert_eq!(result.items.len(), 1);
        assert!(result.items[0].content.contains("{braces}"));
    }
}
