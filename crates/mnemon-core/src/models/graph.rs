//! Knowledge-graph rows. Kept flat and id-keyed; traversal rematerializes
//! nodes from the store rather than holding pointer graphs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub canonical_name: String,
    pub mentions: u32,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let canonical = canonicalize_entity_name(&name);
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            canonical_name: canonical,
            mentions: 0,
        }
    }
}

/// Lowercased, whitespace-collapsed form used for lookup.
pub fn canonicalize_entity_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relation_type: String,
    pub strength: f64,
    pub confidence: f64,
}

impl Relation {
    pub fn new(
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_entity_id: source_entity_id.into(),
            target_entity_id: target_entity_id.into(),
            relation_type: relation_type.into(),
            strength: 1.0,
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub memory_id: String,
    pub entity_id: String,
}
