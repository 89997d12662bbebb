use super::{ParseError, ProviderError, QueueError, StorageError};

/// Top-level error type for the Mnemon engine.
/// All subsystem errors convert into this via `From` impls.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("degraded mode: {component} using fallback: {fallback}")]
    DegradedMode { component: String, fallback: String },
}

/// Convenience type alias.
pub type EngineResult<T> = Result<T, EngineError>;
