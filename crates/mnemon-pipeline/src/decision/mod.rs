//! The ADD/UPDATE/DELETE/NONE decision engine and its mutation sinks.
//!
//! One code path serves shadow and controlled-write modes: the engine
//! produces verdicts, and the sink strategy either applies them or
//! records them as shadow history.

mod contradiction;
mod engine;
mod sink;

pub use contradiction::{lexical_overlap, syntactic_contradiction};
pub use engine::{DecisionEngine, FactContext, Verdict};
pub use sink::{ApplyMutations, MutationSink, RecordShadowOnly, CHANGED_BY_PIPELINE, CHANGED_BY_SHADOW};
