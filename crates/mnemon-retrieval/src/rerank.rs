//! Embedding rerank: re-score the head of the candidate list by cosine
//! similarity of each candidate's cached full-content embedding against
//! the query embedding, blended with the pre-rerank score.

use chrono::{DateTime, Utc};

use mnemon_core::errors::EngineResult;
use mnemon_storage::{queries::embedding_ops, queries::memory_crud, StorageEngine};

use crate::RankedMemory;

pub fn rerank_head(
    storage: &StorageEngine,
    ranked: &mut [(RankedMemory, DateTime<Utc>)],
    query_vector: &[f32],
    top_n: usize,
    blend: f64,
) -> EngineResult<()> {
    // Work on the current head by pre-rerank score.
    ranked.sort_by(|(a, _), (b, _)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let head = ranked.len().min(top_n);
    for (memory, _) in ranked.iter_mut().take(head) {
        let cached = storage.with_read(|conn| {
            let Some(row) = memory_crud::get_memory(conn, &memory.id)? else {
                return Ok(None);
            };
            embedding_ops::get_vector(conn, &row.content_hash)
        })?;
        if let Some(vector) = cached {
            let similarity = cosine(query_vector, &vector);
            memory.score = blend * similarity + (1.0 - blend) * memory.score;
        }
    }
    Ok(())
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identity_and_orthogonal() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
