//! One parser per source family, all behind `DocumentParser`.

mod chat;
mod code_repo;
mod markdown;
mod pdf_text;
mod transcript;

pub use chat::ChatExportParser;
pub use code_repo::CodeRepoParser;
pub use markdown::MarkdownParser;
pub use pdf_text::PdfTextParser;
pub use transcript::TranscriptParser;

use mnemon_core::traits::DocumentParser;

/// Resolve a parser by source type. The ingest driver consumes only the
/// trait, never a concrete parser.
pub fn parser_for(source_type: &str) -> Option<Box<dyn DocumentParser>> {
    match source_type {
        "markdown" | "md" => Some(Box::new(MarkdownParser)),
        "pdf" => Some(Box::new(PdfTextParser)),
        "chat" | "slack" | "discord" => Some(Box::new(ChatExportParser)),
        "code_repo" | "repo" => Some(Box::new(CodeRepoParser)),
        "transcript" | "session" => Some(Box::new(TranscriptParser::default())),
        _ => None,
    }
}
