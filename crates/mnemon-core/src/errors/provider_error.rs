use std::time::Duration;

/// Errors raised by LLM and embedding providers.
///
/// Timeouts are a distinct variant so job retry logic can tell a slow
/// provider from a broken one; `Unavailable` is what `available()` probes
/// report, never a generation failure.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider '{provider}' timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("provider '{provider}' protocol error: {message}")]
    Protocol { provider: String, message: String },

    #[error("provider '{provider}' unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("http error: {0}")]
    Http(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}
