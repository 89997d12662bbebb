//! LLM-driven extraction of typed knowledge items.
//!
//! Three flavors share one response parser; they differ in type
//! taxonomy, synonym table, default type, and minimum item length.

mod prompts;
mod response;

pub use prompts::{build_prompt, continuity_prompt, contradiction_prompt, summary_prompt};
pub use response::parse_response;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use mnemon_core::models::{ExtractionResult, MemoryType};
use mnemon_core::traits::{GenerateOptions, LlmProvider};

/// Which extraction prompt and taxonomy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorFlavor {
    /// Documents: fact, decision, rationale, preference, procedural,
    /// semantic, system.
    Document,
    /// Chat exports: adds skill; shorter items tolerated less.
    Chat,
    /// Coding-session transcripts: adds skill.
    Session,
}

impl ExtractorFlavor {
    pub fn default_type(&self) -> MemoryType {
        match self {
            Self::Document => MemoryType::Fact,
            Self::Chat | Self::Session => MemoryType::Fact,
        }
    }

    /// Minimum trimmed item length; anything shorter is dropped with a
    /// warning.
    pub fn min_item_len(&self) -> usize {
        match self {
            Self::Document => 10,
            Self::Chat => 15,
            Self::Session => 12,
        }
    }

    /// Map alternative type names the model likes to emit onto the
    /// canonical taxonomy.
    pub fn resolve_type(&self, raw: &str) -> Option<MemoryType> {
        let lowered = raw.trim().to_lowercase();
        if let Some(t) = MemoryType::parse(&lowered) {
            if self.allows(t) {
                return Some(t);
            }
        }
        let mapped = match lowered.as_str() {
            "configuration" | "config" | "setting" => Some(MemoryType::System),
            "architectural" | "architecture" | "design" => Some(MemoryType::Decision),
            "action-item" | "action_item" | "todo" => Some(MemoryType::Decision),
            "insight" | "learning" | "lesson" => Some(MemoryType::Semantic),
            "howto" | "how-to" | "workflow" => Some(MemoryType::Procedural),
            "technique" | "pattern" => match self {
                Self::Document => Some(MemoryType::Procedural),
                Self::Chat | Self::Session => Some(MemoryType::Skill),
            },
            _ => None,
        };
        mapped.filter(|t| self.allows(*t))
    }

    fn allows(&self, t: MemoryType) -> bool {
        match self {
            Self::Document => !matches!(t, MemoryType::Skill | MemoryType::DocumentChunk),
            Self::Chat | Self::Session => !matches!(t, MemoryType::DocumentChunk),
        }
    }
}

/// Prompt construction + response parsing around an `LlmProvider`.
pub struct Extractor {
    provider: Arc<dyn LlmProvider>,
    flavor: ExtractorFlavor,
    min_confidence: f64,
    timeout: Duration,
    max_tokens: u32,
}

impl Extractor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        flavor: ExtractorFlavor,
        min_confidence: f64,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            flavor,
            min_confidence,
            timeout,
            max_tokens,
        }
    }

    pub fn flavor(&self) -> ExtractorFlavor {
        self.flavor
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one extraction. Provider failure yields an empty result with
    /// a warning; this never returns an error. The outcome reports how
    /// the provider call went so callers can feed health tracking.
    pub async fn extract(&self, source_text: &str) -> (ExtractionResult, ExtractOutcome) {
        let prompt = prompts::build_prompt(self.flavor, source_text);
        let opts = GenerateOptions {
            timeout: Some(self.timeout),
            max_tokens: Some(self.max_tokens),
        };

        match self.provider.generate_with_usage(&prompt, opts).await {
            Ok(generation) => {
                let mut result =
                    parse_response(&generation.text, self.flavor, self.min_confidence);
                result.usage = generation.usage;
                (result, ExtractOutcome::Success)
            }
            Err(e) => {
                warn!("extraction call failed: {e}");
                let outcome = if e.is_timeout() {
                    ExtractOutcome::Timeout
                } else {
                    ExtractOutcome::Failure
                };
                (
                    ExtractionResult::failed(format!("llm error: {e}")),
                    outcome,
                )
            }
        }
    }
}

/// How the underlying provider call went, independent of parse quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Success,
    Failure,
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_resolve_per_flavor() {
        let doc = ExtractorFlavor::Document;
        assert_eq!(doc.resolve_type("configuration"), Some(MemoryType::System));
        assert_eq!(doc.resolve_type("architectural"), Some(MemoryType::Decision));
        assert_eq!(doc.resolve_type("action-item"), Some(MemoryType::Decision));
        // Documents never yield skills; the technique synonym maps to
        // procedural there and to skill for conversational flavors.
        assert_eq!(doc.resolve_type("technique"), Some(MemoryType::Procedural));
        assert_eq!(doc.resolve_type("skill"), None);
        assert_eq!(
            ExtractorFlavor::Chat.resolve_type("technique"),
            Some(MemoryType::Skill)
        );
        assert_eq!(
            ExtractorFlavor::Session.resolve_type("skill"),
            Some(MemoryType::Skill)
        );
    }

    #[test]
    fn test_unknown_type_is_none() {
        assert_eq!(ExtractorFlavor::Document.resolve_type("vibes"), None);
    }
}
