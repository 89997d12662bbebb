//! Summary worker: one job per session-end. Produces a librarian
//! summary (written as dated markdown under the data directory),
//! inserts the deduplicated facts through the decision path, and closes
//! the loop with a continuity score for every memory that was injected
//! into the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use mnemon_core::errors::{EngineResult, QueueError};
use mnemon_core::models::{Job, JobType, SessionScore};
use mnemon_core::traits::{GenerateOptions, LlmProvider};
use mnemon_llm::extractor::{self, parse_response};
use mnemon_llm::ExtractorFlavor;
use mnemon_storage::queries::{document_ops, memory_crud, session_ops};
use mnemon_storage::StorageEngine;

use crate::decision::{DecisionEngine, FactContext, MutationSink};
use crate::queue::JobQueue;
use crate::workers::handle::{Tick, WorkerHandle};

pub struct SummaryWorker {
    storage: Arc<StorageEngine>,
    queue: JobQueue,
    provider: Arc<dyn LlmProvider>,
    engine: Arc<DecisionEngine>,
    sink: Arc<dyn MutationSink>,
    summaries_dir: PathBuf,
    max_retries: u32,
}

impl SummaryWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        storage: Arc<StorageEngine>,
        queue: JobQueue,
        provider: Arc<dyn LlmProvider>,
        engine: Arc<DecisionEngine>,
        sink: Arc<dyn MutationSink>,
        summaries_dir: PathBuf,
        poll: Duration,
        max_retries: u32,
    ) -> WorkerHandle {
        let worker = Arc::new(Self {
            storage,
            queue,
            provider,
            engine,
            sink,
            summaries_dir,
            max_retries,
        });
        WorkerHandle::spawn("summary", poll, move || {
            let worker = Arc::clone(&worker);
            async move { worker.tick().await }
        })
    }

    async fn tick(&self) -> EngineResult<Tick> {
        let Some(job) = self.queue.lease(JobType::Summary, self.max_retries)? else {
            return Ok(Tick::Idle);
        };

        match self.process(&job).await {
            Ok(result) => {
                self.queue.complete(&job, Some(result))?;
                Ok(Tick::Worked)
            }
            Err(e) => {
                let status = self.queue.fail(&job, &e.to_string(), self.max_retries)?;
                warn!("summary job {} failed ({e}), now {:?}", job.id, status);
                Err(e)
            }
        }
    }

    async fn process(&self, job: &Job) -> EngineResult<Value> {
        let document_id = job
            .document_id
            .as_deref()
            .ok_or_else(|| QueueError::MissingKey {
                id: job.id.clone(),
                field: "document_id",
            })?;
        let document = self
            .storage
            .with_read(|conn| document_ops::get_document(conn, document_id))?
            .ok_or_else(|| mnemon_core::errors::StorageError::NotFound {
                table: "documents",
                id: document_id.to_string(),
            })?;
        let session_key = document
            .source_url
            .clone()
            .unwrap_or_else(|| document.id.clone());

        // Librarian call.
        let prompt = extractor::summary_prompt(&document.raw_content);
        let response = self
            .provider
            .generate(&prompt, GenerateOptions::default())
            .await?;

        let summary_text = extract_summary(&response).unwrap_or_default();
        // `facts` rides the shared parser: same validation, synonym
        // mapping, and warnings as any extraction.
        let parsed = parse_response(&response, ExtractorFlavor::Session, 0.0);

        let summary_path = if summary_text.trim().is_empty() {
            None
        } else {
            Some(self.write_summary_file(&summary_text)?)
        };

        let ctx = FactContext {
            source_memory_id: None,
            source_type: Some("session".to_string()),
            source_path: summary_path
                .as_ref()
                .map(|p| p.display().to_string()),
            source_section: Some(session_key.clone()),
            extraction_model: Some(self.provider.name().to_string()),
        };
        let mut stats = mnemon_core::models::WriteStats::default();
        for fact in &parsed.items {
            let verdict = self.engine.decide(fact).await?;
            self.sink.apply(&ctx, fact, &verdict, &mut stats).await?;
        }

        // Continuity scoring for injected memories.
        let scored = self.score_continuity(&session_key, &document.raw_content).await?;

        info!(
            "session {} summarized: {} facts, {} injected memories scored",
            session_key,
            parsed.items.len(),
            scored
        );
        Ok(json!({
            "sessionKey": session_key,
            "summaryPath": summary_path.map(|p| p.display().to_string()),
            "facts": parsed.items.len(),
            "warnings": parsed.warnings,
            "writeStats": stats,
            "scoredMemories": scored,
        }))
    }

    /// `YYYY-MM-DD-<slug>.md` from the first `##` heading; suffix search
    /// then timestamp fallback on collision.
    fn write_summary_file(&self, summary: &str) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(&self.summaries_dir)
            .map_err(mnemon_core::errors::StorageError::Io)?;

        let heading = summary
            .lines()
            .find_map(|l| l.strip_prefix("## "))
            .unwrap_or("session");
        let date = Utc::now().format("%Y-%m-%d");
        let base = format!("{date}-{}", slugify(heading));

        let path = resolve_collision(&self.summaries_dir, &base);
        std::fs::write(&path, summary).map_err(mnemon_core::errors::StorageError::Io)?;
        Ok(path)
    }

    async fn score_continuity(
        &self,
        session_key: &str,
        session_text: &str,
    ) -> EngineResult<usize> {
        let injected = self
            .storage
            .with_read(|conn| session_ops::injected_for_session(conn, session_key))?;
        if injected.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = injected.iter().map(|m| m.memory_id.clone()).collect();
        let memories = self
            .storage
            .with_read(|conn| memory_crud::get_many(conn, &ids))?;
        let listing: Vec<(String, String)> = memories
            .iter()
            .map(|m| (m.id.clone(), m.content.clone()))
            .collect();

        let prompt = extractor::continuity_prompt(session_text, &listing);
        let response = match self
            .provider
            .generate(&prompt, GenerateOptions::default())
            .await
        {
            Ok(text) => text,
            Err(e) => {
                // Scoring is feedback, not correctness; skip on failure.
                warn!("continuity scoring failed for {session_key}: {e}");
                return Ok(0);
            }
        };

        let Some(scores) = parse_scores(&response) else {
            return Ok(0);
        };

        let mut written = 0usize;
        let mut total = 0.0f64;
        self.storage.with_write_tx(|conn| {
            for (id, relevance) in &scores {
                session_ops::set_relevance(conn, session_key, id, *relevance)?;
            }
            Ok(())
        })?;
        for (_, relevance) in &scores {
            total += relevance;
            written += 1;
        }
        if written > 0 {
            let score = SessionScore {
                session_key: session_key.to_string(),
                score: total / written as f64,
                rationale: None,
                created_at: Utc::now(),
            };
            self.storage
                .with_write_tx(|conn| session_ops::record_score(conn, &score))?;
        }
        Ok(written)
    }
}

fn extract_summary(response: &str) -> Option<String> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    let value: Value = serde_json::from_str(response.get(start..=end)?).ok()?;
    value
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_scores(response: &str) -> Option<Vec<(String, f64)>> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    let value: Value = serde_json::from_str(response.get(start..=end)?).ok()?;
    let scores = value.get("scores")?.as_array()?;
    Some(
        scores
            .iter()
            .filter_map(|s| {
                let id = s.get("id")?.as_str()?.to_string();
                let relevance = s.get("relevance")?.as_f64()?.clamp(0.0, 1.0);
                Some((id, relevance))
            })
            .collect(),
    )
}

fn slugify(heading: &str) -> String {
    let mut slug: String = heading
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "session".to_string()
    } else {
        slug.chars().take(60).collect()
    }
}

/// `<base>.md`, then `<base>-2.md` … `<base>-9.md`, then a timestamped
/// name that cannot collide.
fn resolve_collision(dir: &Path, base: &str) -> PathBuf {
    let candidate = dir.join(format!("{base}.md"));
    if !candidate.exists() {
        return candidate;
    }
    for n in 2..10 {
        let candidate = dir.join(format!("{base}-{n}.md"));
        if !candidate.exists() {
            return candidate;
        }
    }
    dir.join(format!("{base}-{}.md", Utc::now().format("%H%M%S%3f")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fixing the Auth Flow!"), "fixing-the-auth-flow");
        assert_eq!(slugify("///"), "session");
    }

    #[test]
    fn test_collision_suffix_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2026-08-01-work.md"), "x").unwrap();
        std::fs::write(dir.path().join("2026-08-01-work-2.md"), "x").unwrap();
        let path = resolve_collision(dir.path(), "2026-08-01-work");
        assert!(path.ends_with("2026-08-01-work-3.md"));
    }

    #[test]
    fn test_extract_summary_and_scores() {
        let response = r###"{"summary": "## Did things\nbody", "facts": []}"###;
        assert_eq!(
            extract_summary(response).as_deref(),
            Some("## Did things\nbody")
        );
        let scores =
            parse_scores(r#"{"scores": [{"id": "a", "relevance": 1.7}, {"id": "b"}]}"#).unwrap();
        assert_eq!(scores, vec![("a".to_string(), 1.0)]);
    }
}
