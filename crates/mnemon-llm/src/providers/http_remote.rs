//! Remote HTTP provider with session resumption.
//!
//! Generations run against a server-side session. A 404/410 means the
//! session expired: reset it and retry once. A second failure falls back
//! to the configured secondary provider when one exists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use mnemon_core::errors::ProviderError;
use mnemon_core::models::{Generation, TokenUsage};
use mnemon_core::traits::{GenerateOptions, LlmProvider};

use super::effective_timeout;

pub struct HttpRemoteProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    default_timeout: Duration,
    session_id: Mutex<Option<String>>,
    fallback: Option<Arc<dyn LlmProvider>>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteGeneration {
    text: String,
    #[serde(default)]
    usage: Option<RemoteUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct RemoteUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read: u64,
    #[serde(default)]
    cache_creation: u64,
    #[serde(default)]
    cost: f64,
}

impl HttpRemoteProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        fallback: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            default_timeout: timeout,
            session_id: Mutex::new(None),
            fallback,
        }
    }

    async fn ensure_session(&self, timeout: Duration) -> Result<String, ProviderError> {
        let mut guard = self.session_id.lock().await;
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }
        let request = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .json(&serde_json::json!({ "model": self.model }))
            .send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| self.timeout_err(timeout))?
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Protocol {
                provider: self.name().to_string(),
                message: format!("session create: status {}", response.status()),
            });
        }
        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol {
                provider: self.name().to_string(),
                message: e.to_string(),
            })?;
        debug!("opened remote session {}", session.id);
        *guard = Some(session.id.clone());
        Ok(session.id)
    }

    async fn reset_session(&self) {
        let mut guard = self.session_id.lock().await;
        *guard = None;
    }

    fn timeout_err(&self, timeout: Duration) -> ProviderError {
        ProviderError::Timeout {
            provider: self.name().to_string(),
            timeout,
        }
    }

    /// One generate attempt. `Err(true)` from the inner result means the
    /// session is gone and a retry with a fresh session makes sense.
    async fn attempt(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
        timeout: Duration,
    ) -> Result<RemoteGeneration, (ProviderError, bool)> {
        let session = self
            .ensure_session(timeout)
            .await
            .map_err(|e| (e, false))?;

        let mut body = serde_json::json!({ "prompt": prompt });
        if let Some(max_tokens) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        let request = self
            .client
            .post(format!(
                "{}/v1/sessions/{}/messages",
                self.base_url, session
            ))
            .json(&body)
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| (self.timeout_err(timeout), false))?
            .map_err(|e| (ProviderError::Http(e.to_string()), false))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err((
                ProviderError::Protocol {
                    provider: self.name().to_string(),
                    message: format!("session lost: status {status}"),
                },
                true,
            ));
        }
        if !status.is_success() {
            return Err((
                ProviderError::Protocol {
                    provider: self.name().to_string(),
                    message: format!("status {status}"),
                },
                false,
            ));
        }

        response
            .json::<RemoteGeneration>()
            .await
            .map_err(|e| {
                (
                    ProviderError::Protocol {
                        provider: self.name().to_string(),
                        message: e.to_string(),
                    },
                    false,
                )
            })
    }

    async fn generate_inner(
        &self,
        prompt: &str,
        opts: GenerateOptions,
    ) -> Result<RemoteGeneration, ProviderError> {
        let timeout = effective_timeout(&opts, self.default_timeout);

        match self.attempt(prompt, &opts, timeout).await {
            Ok(generation) => return Ok(generation),
            Err((error, retryable)) => {
                if !retryable {
                    return self.fall_back(prompt, opts, error).await;
                }
                warn!("remote session lost, resetting and retrying once");
                self.reset_session().await;
            }
        }

        match self.attempt(prompt, &opts, timeout).await {
            Ok(generation) => Ok(generation),
            Err((error, _)) => self.fall_back(prompt, opts, error).await,
        }
    }

    async fn fall_back(
        &self,
        prompt: &str,
        opts: GenerateOptions,
        error: ProviderError,
    ) -> Result<RemoteGeneration, ProviderError> {
        let Some(fallback) = &self.fallback else {
            return Err(error);
        };
        warn!(
            "remote provider failed ({error}), falling back to {}",
            fallback.name()
        );
        let generation = fallback.generate_with_usage(prompt, opts).await?;
        Ok(RemoteGeneration {
            text: generation.text,
            usage: None,
        })
    }
}

#[async_trait]
impl LlmProvider for HttpRemoteProvider {
    fn name(&self) -> &str {
        "remote-http"
    }

    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String, ProviderError> {
        Ok(self.generate_inner(prompt, opts).await?.text)
    }

    async fn generate_with_usage(
        &self,
        prompt: &str,
        opts: GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let start = Instant::now();
        let generation = self.generate_inner(prompt, opts).await?;
        let usage = generation.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            cache_read: u.cache_read,
            cache_creation: u.cache_creation,
            cost: u.cost,
            duration_ms: start.elapsed().as_millis() as u64,
        });
        Ok(Generation {
            text: generation.text,
            usage,
        })
    }

    async fn available(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/v1/health", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        matches!(probe, Ok(r) if r.status().is_success())
    }
}
