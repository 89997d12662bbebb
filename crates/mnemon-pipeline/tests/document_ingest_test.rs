//! Document pipeline: queued → done with chunk-derived memories, link
//! rows, and per-document dedup on re-ingest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mnemon_core::config::ChunkerConfig;
use mnemon_core::errors::ProviderError;
use mnemon_core::models::{Document, MemoryType};
use mnemon_core::traits::EmbeddingProvider;
use mnemon_pipeline::workers::DocumentIngestWorker;
use mnemon_pipeline::JobQueue;
use mnemon_storage::queries::document_ops;
use mnemon_storage::StorageEngine;

struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed-3d"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, ProviderError> {
        Ok(Some(vec![0.5, 0.5, 0.5]))
    }
}

fn markdown_fixture() -> String {
    let mut doc = String::from("# Guide\n\n");
    for i in 0..4 {
        doc.push_str(&format!("## Part {i}\n\n"));
        doc.push_str(&format!("Section {i} body. ").repeat(40).as_str());
        doc.push_str("\n\n");
    }
    doc
}

async fn run_ingest(storage: &Arc<StorageEngine>, document_id: &str) {
    let queue = JobQueue::new(Arc::clone(storage));
    queue.enqueue_document(document_id, 3).unwrap();

    let mut worker = DocumentIngestWorker::start(
        Arc::clone(storage),
        queue,
        Some(Arc::new(FixedEmbedder)),
        ChunkerConfig {
            max_tokens: 120,
            min_tokens: 10,
            overlap_tokens: 20,
        },
        Duration::from_millis(25),
        3,
    );

    for _ in 0..200 {
        let status: String = storage
            .with_read(|conn| {
                conn.query_row(
                    "SELECT status FROM documents WHERE id = ?1",
                    [document_id],
                    |r| r.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        if status == "done" || status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    worker.stop().await;
}

#[tokio::test]
async fn document_reaches_done_with_linked_chunk_memories() {
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let mut document = Document::new("markdown", &markdown_fixture());
    document.title = Some("Guide".to_string());
    let document_id = document.id.clone();
    storage
        .with_write_tx(|conn| document_ops::insert_document(conn, &document))
        .unwrap();

    run_ingest(&storage, &document_id).await;

    let stored = storage
        .with_read(|conn| document_ops::get_document(conn, &document_id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.status.as_str(), "done");
    assert!(stored.chunk_count > 0);
    assert_eq!(stored.chunk_count, stored.memory_count, "first ingest links every chunk");

    let (memories, links, embeddings): (i64, i64, i64) = storage
        .with_read(|conn| {
            let memories = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE memory_type = 'document_chunk'",
                [],
                |r| r.get(0),
            )?;
            let links = conn.query_row(
                "SELECT COUNT(*) FROM document_memories WHERE document_id = ?1",
                [document_id.as_str()],
                |r| r.get(0),
            )?;
            let embeddings =
                conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
            Ok((memories, links, embeddings))
        })
        .unwrap();
    assert_eq!(memories as u32, stored.memory_count);
    assert_eq!(links as u32, stored.memory_count);
    assert_eq!(embeddings as u32, stored.memory_count);

    // Provenance flows through to the chunk memories.
    let sample = storage
        .with_read(|conn| {
            mnemon_storage::queries::memory_crud::list_page(conn, None, 1)
        })
        .unwrap();
    assert_eq!(sample[0].memory_type, MemoryType::DocumentChunk);
    assert_eq!(sample[0].source_id.as_deref(), Some(document_id.as_str()));
    assert!(sample[0].source_section.is_some());
}

#[tokio::test]
async fn reingest_dedupes_existing_chunks() {
    let storage = Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap());
    let document = Document::new("markdown", &markdown_fixture());
    let document_id = document.id.clone();
    storage
        .with_write_tx(|conn| document_ops::insert_document(conn, &document))
        .unwrap();

    run_ingest(&storage, &document_id).await;
    let first: i64 = storage
        .with_read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
                .map_err(Into::into)
        })
        .unwrap();

    // Second pass over the same content adds nothing.
    storage
        .with_write_tx(|conn| {
            document_ops::set_status(
                conn,
                &document_id,
                mnemon_core::models::DocumentStatus::Queued,
            )
        })
        .unwrap();
    run_ingest(&storage, &document_id).await;

    let second: i64 = storage
        .with_read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
                .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(first, second, "re-ingest must not duplicate chunk memories");
}
