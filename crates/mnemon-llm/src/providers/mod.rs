mod http_local;
mod http_remote;
mod subprocess;

pub use http_local::HttpLocalProvider;
pub use http_remote::HttpRemoteProvider;
pub use subprocess::SubprocessProvider;

use std::sync::Arc;
use std::time::Duration;

use mnemon_core::config::LlmConfig;
use mnemon_core::errors::{EngineError, ProviderError};
use mnemon_core::traits::{GenerateOptions, LlmProvider};

/// The effective timeout for one call: per-call override, else the
/// provider default.
pub(crate) fn effective_timeout(opts: &GenerateOptions, default: Duration) -> Duration {
    opts.timeout.unwrap_or(default)
}

/// Build the configured provider. The remote variant gets the local
/// HTTP provider as its fallback when `fallback_provider` names one.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, EngineError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    match config.provider.as_str() {
        "local_http" => Ok(Arc::new(HttpLocalProvider::new(
            config.base_url.clone(),
            config.model.clone(),
            timeout,
        ))),
        "subprocess" => Ok(Arc::new(SubprocessProvider::new(&config.command, timeout)?)),
        "remote_http" => {
            let fallback: Option<Arc<dyn LlmProvider>> =
                match config.fallback_provider.as_deref() {
                    Some("local_http") => Some(Arc::new(HttpLocalProvider::new(
                        config.base_url.clone(),
                        config.model.clone(),
                        timeout,
                    ))),
                    Some("subprocess") => {
                        Some(Arc::new(SubprocessProvider::new(&config.command, timeout)?))
                    }
                    _ => None,
                };
            Ok(Arc::new(HttpRemoteProvider::new(
                config.base_url.clone(),
                config.model.clone(),
                timeout,
                fallback,
            )))
        }
        other => Err(EngineError::from(ProviderError::Unavailable {
            provider: other.to_string(),
            reason: "unknown provider kind".to_string(),
        })),
    }
}
