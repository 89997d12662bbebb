//! Memories, history, jobs, and documents.

use rusqlite::Connection;

use mnemon_core::errors::StorageError;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE memories (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            normalized_content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            memory_type TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 1.0,
            importance REAL NOT NULL DEFAULT 0.5,
            pinned INTEGER NOT NULL DEFAULT 0,
            source_type TEXT,
            source_id TEXT,
            source_path TEXT,
            source_section TEXT,
            extraction_status TEXT NOT NULL DEFAULT 'none',
            extraction_model TEXT,
            embedding_model TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            updated_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            vector_clock TEXT NOT NULL DEFAULT '{}'
        );

        -- Dedup invariant: one live memory per hash. Tombstones are exempt.
        CREATE UNIQUE INDEX idx_memories_live_hash
            ON memories(content_hash) WHERE is_deleted = 0;
        CREATE INDEX idx_memories_created ON memories(created_at, id);
        CREATE INDEX idx_memories_deleted ON memories(is_deleted, deleted_at);
        CREATE INDEX idx_memories_extraction
            ON memories(extraction_status) WHERE extraction_status = 'pending';

        CREATE TABLE memory_history (
            id TEXT PRIMARY KEY,
            memory_id TEXT NOT NULL,
            event TEXT NOT NULL,
            new_content TEXT,
            changed_by TEXT NOT NULL,
            reason TEXT,
            metadata_json TEXT NOT NULL DEFAULT 'null',
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_history_memory ON memory_history(memory_id, created_at);
        CREATE INDEX idx_history_event ON memory_history(event, created_at);

        CREATE TABLE memory_jobs (
            id TEXT PRIMARY KEY,
            memory_id TEXT,
            document_id TEXT,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            leased_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            error TEXT,
            result TEXT
        );

        -- Queue exclusivity: one pending-or-leased job per key + type.
        CREATE UNIQUE INDEX idx_jobs_active_key
            ON memory_jobs(COALESCE(memory_id, document_id), job_type)
            WHERE status IN ('pending', 'leased');
        CREATE INDEX idx_jobs_lease
            ON memory_jobs(job_type, status, created_at);
        CREATE INDEX idx_jobs_updated ON memory_jobs(status, updated_at);

        CREATE TABLE documents (
            id TEXT PRIMARY KEY,
            source_url TEXT,
            source_type TEXT NOT NULL,
            title TEXT,
            raw_content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            chunk_count INTEGER NOT NULL DEFAULT 0,
            memory_count INTEGER NOT NULL DEFAULT 0,
            connector_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE document_memories (
            document_id TEXT NOT NULL,
            memory_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            PRIMARY KEY (document_id, memory_id)
        );
        CREATE INDEX idx_document_memories_memory ON document_memories(memory_id);",
    )?;
    Ok(())
}
