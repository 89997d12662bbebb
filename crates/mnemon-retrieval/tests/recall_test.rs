//! Hybrid recall: lexical ranking, graph boost with one-hop expansion,
//! blended ordering, and the min-score filter.

use std::sync::Arc;

use mnemon_core::config::RecallConfig;
use mnemon_core::models::{EntityMention, Memory, MemoryType, Relation};
use mnemon_retrieval::RecallEngine;
use mnemon_storage::queries::{graph_ops, memory_crud};
use mnemon_storage::StorageEngine;

fn engine() -> Arc<StorageEngine> {
    Arc::new(StorageEngine::open_in_memory_with_dimensions(3).unwrap())
}

fn insert(storage: &StorageEngine, content: &str) -> Memory {
    let memory = Memory::new(content, MemoryType::Fact);
    storage
        .with_write_tx(|conn| memory_crud::insert_memory(conn, &memory))
        .unwrap();
    memory
}

fn recall_engine(storage: Arc<StorageEngine>) -> RecallEngine {
    RecallEngine::new(storage, None, RecallConfig::default())
}

#[tokio::test]
async fn lexical_recall_ranks_matches() {
    let storage = engine();
    insert(&storage, "The deploy pipeline runs on merge to main");
    insert(&storage, "Dark mode is the preferred editor theme");
    let recall = recall_engine(Arc::clone(&storage));

    let results = recall.recall("deploy pipeline", 10, 0.0).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("deploy pipeline"));
    assert!(results[0].score > 0.0);
}

#[tokio::test]
async fn deleted_memories_never_surface() {
    let storage = engine();
    let m = insert(&storage, "secret that was retracted later");
    storage
        .with_write_tx(|conn| memory_crud::soft_delete(conn, &m.id, "test"))
        .unwrap();
    let recall = recall_engine(Arc::clone(&storage));

    let results = recall.recall("retracted secret", 10, 0.0).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn graph_boost_includes_one_hop_neighbors() {
    let storage = engine();
    // mem-jsx never mentions "react": only the graph can surface it.
    let mem_react = insert(&storage, "React is the UI library used in the frontend");
    let mem_jsx = insert(&storage, "JSX syntax compiles to function calls");

    storage
        .with_write_tx(|conn| {
            let react = graph_ops::upsert_entity(conn, "React")?;
            let jsx = graph_ops::upsert_entity(conn, "JSX")?;
            graph_ops::upsert_relation(conn, &Relation::new(&react, &jsx, "related_to"))?;
            graph_ops::link_mention(
                conn,
                &EntityMention {
                    memory_id: mem_react.id.clone(),
                    entity_id: react,
                },
            )?;
            graph_ops::link_mention(
                conn,
                &EntityMention {
                    memory_id: mem_jsx.id.clone(),
                    entity_id: jsx,
                },
            )
        })
        .unwrap();

    let recall = recall_engine(Arc::clone(&storage));
    let results = recall.recall("react", 10, 0.0).await.unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&mem_react.id.as_str()), "direct mention missing");
    assert!(ids.contains(&mem_jsx.id.as_str()), "one-hop neighbor missing");
    for result in &results {
        assert!(result.entity_hits >= 1, "graph results carry entity_hits");
    }
}

#[tokio::test]
async fn min_score_filters_weak_results() {
    let storage = engine();
    insert(&storage, "completely unrelated note about gardening");
    let recall = recall_engine(Arc::clone(&storage));

    let results = recall.recall("gardening", 10, 0.99).await.unwrap();
    assert!(results.is_empty(), "weak lexical hit must fall under min_score");
}

#[tokio::test]
async fn top_k_bounds_results() {
    let storage = engine();
    for i in 0..6 {
        insert(&storage, &format!("shared keyword alpha item number {i}"));
    }
    let recall = recall_engine(Arc::clone(&storage));

    let results = recall.recall("alpha", 3, 0.0).await.unwrap();
    assert_eq!(results.len(), 3);
}
