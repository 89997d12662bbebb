//! Markdown parser: a line-oriented state machine.
//!
//! Fenced code blocks (``` or ~~~) delimit code sections, ATX headings
//! set depth, and table/list/blockquote transitions flush the
//! accumulator so no section mixes content types.

use mnemon_core::errors::ParseError;
use mnemon_core::models::{ContentType, ParsedDocument, ParsedSection};
use mnemon_core::traits::DocumentParser;

pub struct MarkdownParser;

#[derive(Debug)]
struct Accumulator {
    heading: Option<String>,
    depth: u8,
    content_type: ContentType,
    language: Option<String>,
    lines: Vec<String>,
    line_start: u32,
}

impl Accumulator {
    fn new(line_start: u32) -> Self {
        Self {
            heading: None,
            depth: 0,
            content_type: ContentType::Text,
            language: None,
            lines: Vec::new(),
            line_start,
        }
    }

    fn flush(&mut self, line_end: u32, out: &mut Vec<ParsedSection>) {
        let content = self.lines.join("\n");
        if !content.trim().is_empty() {
            out.push(ParsedSection {
                heading: self.heading.clone(),
                depth: self.depth,
                content,
                content_type: self.content_type,
                language: self.language.take(),
                page: None,
                line_start: Some(self.line_start),
                line_end: Some(line_end),
            });
        }
        self.lines.clear();
        self.content_type = ContentType::Text;
        self.language = None;
        self.line_start = line_end + 1;
    }
}

fn classify_line(line: &str) -> ContentType {
    let trimmed = line.trim_start();
    if trimmed.starts_with('|') {
        ContentType::Table
    } else if trimmed.starts_with('>') {
        ContentType::Blockquote
    } else if trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
        || is_ordered_list_item(trimmed)
    {
        ContentType::List
    } else {
        ContentType::Text
    }
}

fn is_ordered_list_item(trimmed: &str) -> bool {
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    trimmed[digits.len()..].starts_with(". ")
}

fn heading_level(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = &trimmed[hashes..];
        if rest.starts_with(' ') || rest.is_empty() {
            return Some((hashes as u8, rest.trim()));
        }
    }
    None
}

fn fence_open(line: &str) -> Option<(&'static str, Option<String>)> {
    let trimmed = line.trim_start();
    for marker in ["```", "~~~"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            let lang = rest.trim();
            let language = if lang.is_empty() {
                None
            } else {
                Some(lang.to_string())
            };
            return Some((marker, language));
        }
    }
    None
}

impl DocumentParser for MarkdownParser {
    fn format(&self) -> &'static str {
        "markdown"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument, ParseError> {
        if source.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut sections = Vec::new();
        let mut acc = Accumulator::new(1);
        let mut title: Option<String> = None;
        let mut current_heading: Option<String> = None;
        let mut current_depth: u8 = 0;
        let mut fence: Option<&'static str> = None;

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx as u32 + 1;

            if let Some(open_marker) = fence {
                if line.trim_start().starts_with(open_marker) {
                    acc.flush(line_no, &mut sections);
                    fence = None;
                } else {
                    acc.lines.push(line.to_string());
                }
                continue;
            }

            if let Some((marker, language)) = fence_open(line) {
                acc.flush(line_no.saturating_sub(1), &mut sections);
                fence = Some(marker);
                acc.content_type = ContentType::Code;
                acc.language = language;
                acc.heading = current_heading.clone();
                acc.depth = current_depth;
                acc.line_start = line_no + 1;
                continue;
            }

            if let Some((depth, text)) = heading_level(line) {
                acc.flush(line_no.saturating_sub(1), &mut sections);
                current_heading = Some(text.to_string());
                current_depth = depth;
                if title.is_none() && depth == 1 {
                    title = Some(text.to_string());
                }
                acc.heading = current_heading.clone();
                acc.depth = current_depth;
                acc.line_start = line_no + 1;
                continue;
            }

            let line_type = classify_line(line);
            let effective = if line.trim().is_empty() {
                // Blank lines stay with whatever block is open.
                acc.content_type
            } else {
                line_type
            };
            if effective != acc.content_type && !acc.lines.is_empty() {
                acc.flush(line_no.saturating_sub(1), &mut sections);
                acc.heading = current_heading.clone();
                acc.depth = current_depth;
            }
            acc.content_type = effective;
            acc.heading = current_heading.clone();
            acc.depth = current_depth;
            acc.lines.push(line.to_string());
        }
        let last_line = source.lines().count() as u32;
        acc.flush(last_line, &mut sections);

        let mut doc = ParsedDocument::new("markdown", sections);
        doc.title = title;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_set_depth_and_title() {
        let doc = MarkdownParser
            .parse("# Title\n\nIntro text.\n\n## Sub\n\nBody.\n")
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("Title"));
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading.as_deref(), Some("Title"));
        assert_eq!(doc.sections[0].depth, 1);
        assert_eq!(doc.sections[1].heading.as_deref(), Some("Sub"));
        assert_eq!(doc.sections[1].depth, 2);
    }

    #[test]
    fn test_fenced_code_is_separate_section() {
        let doc = MarkdownParser
            .parse("# H\n\ntext before\n\n```rust\nfn main() {}\n```\n\ntext after\n")
            .unwrap();
        let kinds: Vec<ContentType> = doc.sections.iter().map(|s| s.content_type).collect();
        assert_eq!(
            kinds,
            vec![ContentType::Text, ContentType::Code, ContentType::Text]
        );
        assert_eq!(doc.sections[1].language.as_deref(), Some("rust"));
        assert_eq!(doc.sections[1].content, "fn main() {}");
    }

    #[test]
    fn test_table_does_not_mix_with_text() {
        let doc = MarkdownParser
            .parse("para one\n| a | b |\n|---|---|\n| 1 | 2 |\nafter table\n")
            .unwrap();
        let kinds: Vec<ContentType> = doc.sections.iter().map(|s| s.content_type).collect();
        assert_eq!(
            kinds,
            vec![ContentType::Text, ContentType::Table, ContentType::Text]
        );
    }

    #[test]
    fn test_line_ranges_tracked() {
        let doc = MarkdownParser.parse("alpha\nbeta\n").unwrap();
        assert_eq!(doc.sections[0].line_start, Some(1));
        assert_eq!(doc.sections[0].line_end, Some(2));
    }

    #[test]
    fn test_empty_source_rejected() {
        assert!(matches!(
            MarkdownParser.parse("   \n  "),
            Err(ParseError::Empty)
        ));
    }
}
