//! PDF text parser. Consumes already-extracted text (the byte-level
//! extraction is a pluggable concern); splits on form-feed page breaks
//! and promotes heading-looking lines to section boundaries, falling
//! back to whole-page sections.

use mnemon_core::errors::ParseError;
use mnemon_core::models::{ContentType, ParsedDocument, ParsedSection};
use mnemon_core::traits::DocumentParser;

pub struct PdfTextParser;

const MAX_HEADING_LEN: usize = 80;

/// Heading heuristics, in priority order: ALL CAPS, numbered ("3.",
/// "2.1"), short Title Case.
fn looks_like_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_HEADING_LEN {
        return false;
    }
    if trimmed.ends_with(['.', ':', ';', ',']) && !ends_with_section_number(trimmed) {
        return false;
    }

    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }

    // ALL CAPS.
    if letters.iter().all(|c| c.is_uppercase()) && letters.len() >= 3 {
        return true;
    }

    // Numbered: "1.", "2.3", "4.1.2" followed by words.
    if starts_with_section_number(trimmed) {
        return true;
    }

    // Short Title Case: every word capitalized, few words.
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() <= 8
        && words.iter().all(|w| {
            w.chars()
                .next()
                .is_some_and(|c| c.is_uppercase() || c.is_numeric())
        })
    {
        return true;
    }

    false
}

fn starts_with_section_number(line: &str) -> bool {
    let mut chars = line.chars().peekable();
    let mut saw_digit = false;
    let mut saw_dot = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            saw_digit = true;
            chars.next();
        } else if c == '.' && saw_digit {
            saw_dot = true;
            chars.next();
        } else {
            break;
        }
    }
    saw_digit && saw_dot && chars.peek().is_some_and(|c| c.is_whitespace())
}

fn ends_with_section_number(line: &str) -> bool {
    line.chars().rev().take_while(|c| !c.is_whitespace()).all(|c| c.is_ascii_digit() || c == '.')
}

impl DocumentParser for PdfTextParser {
    fn format(&self) -> &'static str {
        "pdf"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument, ParseError> {
        if source.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut sections = Vec::new();
        for (page_idx, page) in source.split('\u{000C}').enumerate() {
            let page_no = page_idx as u32 + 1;
            if page.trim().is_empty() {
                continue;
            }
            parse_page(page, page_no, &mut sections);
        }

        Ok(ParsedDocument::new("pdf", sections))
    }
}

fn parse_page(page: &str, page_no: u32, out: &mut Vec<ParsedSection>) {
    let mut heading: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    let flush = |heading: &Option<String>, body: &mut Vec<&str>, out: &mut Vec<ParsedSection>| {
        let content = body.join("\n");
        if !content.trim().is_empty() {
            out.push(ParsedSection {
                heading: heading.clone(),
                depth: if heading.is_some() { 2 } else { 1 },
                content,
                content_type: ContentType::Text,
                language: None,
                page: Some(page_no),
                line_start: None,
                line_end: None,
            });
        }
        body.clear();
    };

    for line in page.lines() {
        if looks_like_heading(line) {
            flush(&heading, &mut body, out);
            heading = Some(line.trim().to_string());
        } else {
            body.push(line);
        }
    }
    // When no heuristic fired this emits the whole page as one
    // heading-less section.
    flush(&heading, &mut body, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_feed_splits_pages() {
        let doc = PdfTextParser
            .parse("page one body\u{000C}page two body")
            .unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].page, Some(1));
        assert_eq!(doc.sections[1].page, Some(2));
    }

    #[test]
    fn test_all_caps_promoted_to_heading() {
        let doc = PdfTextParser
            .parse("INTRODUCTION\nSome body text here.\nMETHODS\nMore text.")
            .unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading.as_deref(), Some("INTRODUCTION"));
        assert_eq!(doc.sections[1].heading.as_deref(), Some("METHODS"));
    }

    #[test]
    fn test_numbered_heading() {
        assert!(looks_like_heading("2.1 Retrieval Methods"));
        assert!(!looks_like_heading("the result was 2.1 percent better"));
    }

    #[test]
    fn test_whole_page_fallback() {
        let doc = PdfTextParser
            .parse("just some ordinary prose\nthat has no headings at all")
            .unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].heading.is_none());
    }
}
