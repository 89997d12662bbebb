//! Extraction prompts. Every flavor demands self-contained, atomic,
//! durable, specific items and a JSON-only response with `items` and
//! `relations` arrays.

use super::ExtractorFlavor;

const SHARED_RULES: &str = r#"Rules for items:
1. Each item must be SELF-CONTAINED: understandable with no surrounding context. Resolve pronouns and references.
2. Each item must be ATOMIC: exactly one piece of knowledge. Split compound statements.
3. Each item must be DURABLE: still true and useful weeks from now. Skip transient chatter.
4. Each item must be SPECIFIC: name the actual tool, version, person, or value.
5. confidence is a number between 0 and 1 reflecting how certain the source is.
6. Prefer fewer, better items over many weak ones. Return an empty items array when nothing qualifies.

Respond with a single JSON object and NOTHING else - no prose, no markdown fences:
{
  "items": [
    {"content": "...", "type": "...", "confidence": 0.9}
  ],
  "relations": [
    {"source": "entity name", "relationship": "relates_to", "target": "entity name", "confidence": 0.8}
  ]
}"#;

fn taxonomy(flavor: ExtractorFlavor) -> &'static str {
    match flavor {
        ExtractorFlavor::Document => {
            "Item types: fact (verifiable statement), decision (a choice that was made), \
             rationale (why a choice was made), preference (what the user likes or wants), \
             procedural (how to do something), semantic (conceptual knowledge), \
             system (configuration or environment detail)."
        }
        ExtractorFlavor::Chat => {
            "Item types: fact, decision, rationale, preference, procedural, semantic, \
             system, skill (a demonstrated capability or technique)."
        }
        ExtractorFlavor::Session => {
            "Item types: fact, decision, rationale, preference, procedural, semantic, \
             system, skill (a technique the assistant demonstrated that worked)."
        }
    }
}

fn framing(flavor: ExtractorFlavor) -> &'static str {
    match flavor {
        ExtractorFlavor::Document => {
            "You distill documents into atomic knowledge items for a personal memory store."
        }
        ExtractorFlavor::Chat => {
            "You distill chat conversations into atomic knowledge items for a personal \
             memory store. Ignore greetings, banter, and unresolved questions."
        }
        ExtractorFlavor::Session => {
            "You distill AI coding-session transcripts into atomic knowledge items for a \
             personal memory store. Capture decisions, working techniques, and project \
             facts; ignore dead ends unless the lesson is durable."
        }
    }
}

pub fn build_prompt(flavor: ExtractorFlavor, source_text: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\nSource:\n---\n{}\n---",
        framing(flavor),
        taxonomy(flavor),
        SHARED_RULES,
        source_text
    )
}

/// Prompt for the semantic contradiction check: do two statements
/// conflict?
pub fn contradiction_prompt(existing: &str, incoming: &str) -> String {
    format!(
        "Do these two statements contradict each other?\n\
         A: {existing}\n\
         B: {incoming}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"contradicts\": true or false, \"confidence\": 0.0 to 1.0}}"
    )
}

/// Librarian prompt for the summary worker.
pub fn summary_prompt(session_text: &str) -> String {
    format!(
        "You are a librarian recording what happened in a working session so a \
         future session can continue seamlessly.\n\n\
         Write a markdown summary starting with a '## <title>' heading, then \
         extract durable facts.\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"summary\": \"## Title\\n...markdown...\", \"facts\": [{{\"content\": \"...\", \
         \"type\": \"fact\", \"confidence\": 0.9}}]}}\n\n\
         Session:\n---\n{session_text}\n---"
    )
}

/// Continuity-scoring prompt: how useful was each injected memory?
pub fn continuity_prompt(session_text: &str, memories: &[(String, String)]) -> String {
    let listing: Vec<String> = memories
        .iter()
        .map(|(id, content)| format!("- id {id}: {content}"))
        .collect();
    format!(
        "These memories were injected at the start of a session. Rate how useful \
         each actually was to the work that followed, 0.0 (noise) to 1.0 \
         (essential).\n\nMemories:\n{}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"scores\": [{{\"id\": \"...\", \"relevance\": 0.0}}]}}\n\n\
         Session:\n---\n{}\n---",
        listing.join("\n"),
        session_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_taxonomy_and_source() {
        let p = build_prompt(ExtractorFlavor::Document, "the quick brown fox");
        assert!(p.contains("fact (verifiable statement)"));
        assert!(p.contains("the quick brown fox"));
        assert!(p.contains("NOTHING else"));
        assert!(!p.contains("skill"));
    }

    #[test]
    fn test_chat_flavor_includes_skill() {
        let p = build_prompt(ExtractorFlavor::Chat, "x");
        assert!(p.contains("skill"));
    }
}
