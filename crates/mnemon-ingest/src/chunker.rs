//! Structure-aware chunker.
//!
//! Sections accumulate under a token budget (estimated at chars/4);
//! overflow flushes the accumulator and seeds the next chunk with an
//! overlap tail cut on a sentence or paragraph boundary where possible.
//! Oversize sections are split along their own structure and carry
//! "(part N)" headings. Pure function of `(document, config)`.

use mnemon_core::config::ChunkerConfig;
use mnemon_core::models::{Chunk, ChunkType, ContentType, ParsedDocument, ParsedSection};

pub struct Chunker {
    config: ChunkerConfig,
}

/// chars / 4, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[derive(Default)]
struct Accumulator {
    parts: Vec<String>,
    chars: usize,
    saw_code: bool,
    saw_table: bool,
    heading: Option<String>,
    page: Option<u32>,
    line_start: Option<u32>,
    line_end: Option<u32>,
}

impl Accumulator {
    fn push_section(&mut self, section: &ParsedSection) {
        if self.heading.is_none() {
            self.heading = section.heading.clone();
        }
        if self.page.is_none() {
            self.page = section.page;
        }
        self.line_start = match (self.line_start, section.line_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.line_end = match (self.line_end, section.line_end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        match section.content_type {
            ContentType::Code => self.saw_code = true,
            ContentType::Table => self.saw_table = true,
            _ => {}
        }
        self.chars += section.content.len();
        self.parts.push(section.content.clone());
    }

    fn push_overlap(&mut self, tail: String) {
        self.chars += tail.len();
        self.parts.push(tail);
    }

    fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn chunk_type(&self) -> ChunkType {
        if self.saw_code {
            ChunkType::Code
        } else if self.saw_table {
            ChunkType::Table
        } else {
            ChunkType::Text
        }
    }

    fn text(&self) -> String {
        self.parts.join("\n\n")
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, doc: &ParsedDocument) -> Vec<Chunk> {
        let max_chars = self.config.max_tokens * 4;
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut acc = Accumulator::default();

        for section in &doc.sections {
            if estimate_tokens(&section.content) > self.config.max_tokens {
                self.flush(&mut acc, &mut chunks, None);
                self.emit_split_section(section, max_chars, &mut chunks);
                continue;
            }

            let incoming = estimate_tokens(&section.content);
            let current = estimate_tokens(&acc.text());
            if !acc.is_empty() && current + incoming > self.config.max_tokens {
                let tail = self.overlap_tail(&acc.text());
                self.flush(&mut acc, &mut chunks, tail);
            }
            acc.push_section(section);
        }
        self.flush(&mut acc, &mut chunks, None);

        chunks
    }

    /// Emit the accumulator as a chunk (if it clears the minimum) and
    /// reset it, optionally seeding the next accumulator with an
    /// overlap tail.
    fn flush(&self, acc: &mut Accumulator, chunks: &mut Vec<Chunk>, seed: Option<String>) {
        if !acc.is_empty() {
            let text = acc.text();
            let tokens = estimate_tokens(&text);
            if tokens >= self.config.min_tokens {
                chunks.push(Chunk {
                    index: chunks.len() as u32,
                    text,
                    estimated_tokens: tokens,
                    chunk_type: acc.chunk_type(),
                    heading: acc.heading.clone(),
                    page: acc.page,
                    line_start: acc.line_start,
                    line_end: acc.line_end,
                });
            }
        }
        *acc = Accumulator::default();
        if let Some(tail) = seed {
            if !tail.is_empty() {
                acc.push_overlap(tail);
            }
        }
    }

    /// The tail of the previous chunk carried into the next one.
    /// Cut on ". ", then a paragraph break, then a newline, then raw.
    fn overlap_tail(&self, text: &str) -> Option<String> {
        let overlap_chars = self.config.overlap_tokens * 4;
        if overlap_chars == 0 || text.is_empty() {
            return None;
        }
        if text.len() <= overlap_chars {
            return Some(text.to_string());
        }
        let mut start = text.len() - overlap_chars;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        let window = &text[start..];

        for boundary in [". ", "\n\n", "\n"] {
            if let Some(pos) = window.find(boundary) {
                let cut = &window[pos + boundary.len()..];
                if !cut.trim().is_empty() {
                    return Some(cut.to_string());
                }
            }
        }
        Some(window.to_string())
    }

    /// A section larger than the budget splits along its own structure:
    /// code on blank lines then newlines, text on paragraphs then
    /// sentences. Every part carries a "(part N)" heading.
    fn emit_split_section(
        &self,
        section: &ParsedSection,
        max_chars: usize,
        chunks: &mut Vec<Chunk>,
    ) {
        let separators: &[&str] = if section.content_type == ContentType::Code {
            &["\n\n", "\n"]
        } else {
            &["\n\n", ". "]
        };
        let pieces = split_recursive(&section.content, separators, max_chars);
        let packed = pack_pieces(&pieces, max_chars);

        let base_heading = section.heading.clone().unwrap_or_default();
        let chunk_type = match section.content_type {
            ContentType::Code => ChunkType::Code,
            ContentType::Table => ChunkType::Table,
            _ => ChunkType::Text,
        };
        for (n, part) in packed.iter().enumerate() {
            let tokens = estimate_tokens(part);
            if tokens < self.config.min_tokens {
                continue;
            }
            let heading = if base_heading.is_empty() {
                format!("(part {})", n + 1)
            } else {
                format!("{} (part {})", base_heading, n + 1)
            };
            chunks.push(Chunk {
                index: chunks.len() as u32,
                text: part.clone(),
                estimated_tokens: tokens,
                chunk_type,
                heading: Some(heading),
                page: section.page,
                line_start: section.line_start,
                line_end: section.line_end,
            });
        }
    }
}

/// Split until every piece fits `max_chars`, trying separators in order
/// and falling back to raw character slices.
fn split_recursive(content: &str, separators: &[&str], max_chars: usize) -> Vec<String> {
    if content.len() <= max_chars {
        return vec![content.to_string()];
    }
    let Some((sep, rest)) = separators.split_first() else {
        return raw_slices(content, max_chars);
    };

    let mut out = Vec::new();
    for piece in split_keeping_sep(content, sep) {
        if piece.len() <= max_chars {
            out.push(piece);
        } else {
            out.extend(split_recursive(&piece, rest, max_chars));
        }
    }
    out
}

/// Split on `sep`, keeping the separator attached to the left piece so
/// joins are lossless.
fn split_keeping_sep(content: &str, sep: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(pos) = rest.find(sep) {
        let (head, tail) = rest.split_at(pos + sep.len());
        out.push(head.to_string());
        rest = tail;
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

fn raw_slices(content: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = content;
    while rest.len() > max_chars {
        let mut cut = max_chars;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        out.push(head.to_string());
        rest = tail;
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Greedily rejoin small pieces under the budget.
fn pack_pieces(pieces: &[String], max_chars: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() > max_chars {
            out.push(std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(content: &str, content_type: ContentType) -> ParsedSection {
        ParsedSection {
            heading: Some("H".to_string()),
            depth: 2,
            content: content.to_string(),
            content_type,
            ..ParsedSection::default()
        }
    }

    fn doc(sections: Vec<ParsedSection>) -> ParsedDocument {
        ParsedDocument::new("markdown", sections)
    }

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            max_tokens: 50,
            min_tokens: 5,
            overlap_tokens: 10,
        }
    }

    #[test]
    fn test_accumulates_until_budget() {
        // Two 80-char sections = 40 tokens total, fits one 50-token chunk.
        let chunker = Chunker::new(small_config());
        let chunks = chunker.chunk(&doc(vec![
            section(&"alpha ".repeat(13), ContentType::Text),
            section(&"beta ".repeat(16), ContentType::Text),
        ]));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_overflow_flushes_with_overlap() {
        let chunker = Chunker::new(small_config());
        let first = format!("{}. tail sentence here", "alpha ".repeat(25).trim_end());
        let chunks = chunker.chunk(&doc(vec![
            section(&first, ContentType::Text),
            section(&"beta ".repeat(25), ContentType::Text),
        ]));
        assert_eq!(chunks.len(), 2);
        // Second chunk starts with the overlap tail from the first.
        assert!(
            chunks[1].text.starts_with("tail sentence here"),
            "second chunk: {}",
            &chunks[1].text[..40.min(chunks[1].text.len())]
        );
    }

    #[test]
    fn test_oversize_text_section_splits_with_part_headings() {
        let chunker = Chunker::new(small_config());
        let paragraphs: Vec<String> = (0..6).map(|i| format!("paragraph {i} {}", "word ".repeat(20))).collect();
        let content = paragraphs.join("\n\n");
        let chunks = chunker.chunk(&doc(vec![section(&content, ContentType::Text)]));
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(
                chunk.heading.as_deref(),
                Some(format!("H (part {})", i + 1).as_str())
            );
            assert!(chunk.estimated_tokens <= 50);
        }
    }

    #[test]
    fn test_code_splits_on_blank_lines() {
        let chunker = Chunker::new(small_config());
        let blocks: Vec<String> = (0..5)
            .map(|i| format!("fn f{i}() {{\n    body_{i}();\n    more_{i}();\n}}"))
            .collect();
        let content = blocks.join("\n\n");
        let chunks = chunker.chunk(&doc(vec![section(&content, ContentType::Code)]));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Code));
        // Splits land between functions, not inside them.
        for chunk in &chunks {
            let opens = chunk.text.matches('{').count();
            let closes = chunk.text.matches('}').count();
            assert_eq!(opens, closes, "chunk split a code block: {}", chunk.text);
        }
    }

    #[test]
    fn test_tiny_chunks_discarded() {
        let chunker = Chunker::new(ChunkerConfig {
            max_tokens: 50,
            min_tokens: 20,
            overlap_tokens: 0,
        });
        let chunks = chunker.chunk(&doc(vec![section("tiny", ContentType::Text)]));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunk_type_precedence() {
        let chunker = Chunker::new(small_config());
        let chunks = chunker.chunk(&doc(vec![
            section(&"text ".repeat(10), ContentType::Text),
            section(&"| a | b |\n".repeat(5), ContentType::Table),
        ]));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Table);
    }

    #[test]
    fn test_deterministic() {
        let chunker = Chunker::new(small_config());
        let d = doc(vec![
            section(&"alpha ".repeat(40), ContentType::Text),
            section(&"beta ".repeat(40), ContentType::Code),
        ]);
        let a = chunker.chunk(&d);
        let b = chunker.chunk(&d);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.index, y.index);
        }
    }
}
