//! Knowledge graph: entities, relations, mentions.

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE entities (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            canonical_name TEXT NOT NULL UNIQUE,
            mentions INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX idx_entities_canonical ON entities(canonical_name);

        CREATE TABLE relations (
            id TEXT PRIMARY KEY,
            source_entity_id TEXT NOT NULL,
            target_entity_id TEXT NOT NULL,
            relation_type TEXT NOT NULL,
            strength REAL NOT NULL DEFAULT 1.0,
            confidence REAL NOT NULL DEFAULT 1.0,
            UNIQUE (source_entity_id, target_entity_id, relation_type)
        );
        CREATE INDEX idx_relations_source ON relations(source_entity_id);
        CREATE INDEX idx_relations_target ON relations(target_entity_id);

        CREATE TABLE memory_entity_mentions (
            memory_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            PRIMARY KEY (memory_id, entity_id)
        );
        CREATE INDEX idx_mentions_entity ON memory_entity_mentions(entity_id);",
    )?;
    Ok(())
}
