//! Entity / relation / mention rows and the bounded one-hop lookups the
//! graph boost runs on.

use rusqlite::{params, Connection, OptionalExtension};

use mnemon_core::errors::StorageError;
use mnemon_core::models::{canonicalize_entity_name, Entity, EntityMention, Relation};

/// Insert or bump an entity by canonical name. Returns the entity id.
pub fn upsert_entity(conn: &Connection, name: &str) -> Result<String, StorageError> {
    let canonical = canonicalize_entity_name(name);
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM entities WHERE canonical_name = ?1",
            params![canonical],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE entities SET mentions = mentions + 1 WHERE id = ?1",
            params![id],
        )?;
        return Ok(id);
    }

    let entity = Entity::new(name);
    conn.execute(
        "INSERT INTO entities (id, name, canonical_name, mentions) VALUES (?1, ?2, ?3, 1)",
        params![entity.id, entity.name, entity.canonical_name],
    )?;
    Ok(entity.id)
}

pub fn upsert_relation(conn: &Connection, relation: &Relation) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO relations (
            id, source_entity_id, target_entity_id, relation_type, strength, confidence
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(source_entity_id, target_entity_id, relation_type) DO UPDATE SET
            strength = MIN(2.0, relations.strength + 0.1),
            confidence = MAX(relations.confidence, excluded.confidence)",
        params![
            relation.id,
            relation.source_entity_id,
            relation.target_entity_id,
            relation.relation_type,
            relation.strength,
            relation.confidence,
        ],
    )?;
    Ok(())
}

pub fn link_mention(conn: &Connection, mention: &EntityMention) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO memory_entity_mentions (memory_id, entity_id) VALUES (?1, ?2)",
        params![mention.memory_id, mention.entity_id],
    )?;
    Ok(())
}

/// Entities whose canonical name contains the token.
pub fn entities_matching_token(
    conn: &Connection,
    token: &str,
    limit: usize,
) -> Result<Vec<String>, StorageError> {
    let pattern = format!("%{}%", token.to_lowercase());
    let mut stmt = conn.prepare(
        "SELECT id FROM entities WHERE canonical_name LIKE ?1 LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![pattern, limit as i64], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// One-hop neighbors through relations, both directions, bounded.
pub fn one_hop_neighbors(
    conn: &Connection,
    entity_id: &str,
    limit: usize,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT target_entity_id FROM relations WHERE source_entity_id = ?1
         UNION
         SELECT source_entity_id FROM relations WHERE target_entity_id = ?1
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![entity_id, limit as i64], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Live memories mentioning the entity, bounded.
pub fn memories_mentioning(
    conn: &Connection,
    entity_id: &str,
    limit: usize,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT mem.memory_id FROM memory_entity_mentions mem
         JOIN memories m ON m.id = mem.memory_id AND m.is_deleted = 0
         WHERE mem.entity_id = ?1 LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![entity_id, limit as i64], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
