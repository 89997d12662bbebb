//! # mnemon-pipeline
//!
//! The ingestion-and-curation engine: a leased job queue over the store,
//! the ADD/UPDATE/DELETE/NONE decision engine with shadow and controlled
//! write sinks, the background workers, and the diagnostics-driven
//! maintenance loop with bounded repair actions.

pub mod decision;
pub mod orchestrator;
pub mod queue;
pub mod repair;
pub mod workers;

pub use decision::{ApplyMutations, DecisionEngine, FactContext, MutationSink, RecordShadowOnly, Verdict};
pub use orchestrator::Pipeline;
pub use queue::{Backoff, JobQueue};
