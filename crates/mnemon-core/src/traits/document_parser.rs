use crate::errors::ParseError;
use crate::models::ParsedDocument;

/// Normalizes one source family into a `ParsedDocument`.
///
/// Parsers are pure: the only input is the source string handed in, and
/// identical input always yields identical output.
pub trait DocumentParser: Send + Sync {
    /// Short identifier ("markdown", "pdf", "chat", …).
    fn format(&self) -> &'static str;

    fn parse(&self, source: &str) -> Result<ParsedDocument, ParseError>;
}
