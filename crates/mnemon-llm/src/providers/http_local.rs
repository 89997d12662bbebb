//! Local HTTP provider: one non-streaming generate call against an
//! Ollama-compatible endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use mnemon_core::errors::ProviderError;
use mnemon_core::traits::{GenerateOptions, LlmProvider};

use super::effective_timeout;

pub struct HttpLocalProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    default_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpLocalProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            default_timeout: timeout,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLocalProvider {
    fn name(&self) -> &str {
        "local-http"
    }

    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String, ProviderError> {
        let timeout = effective_timeout(&opts, self.default_timeout);
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(max_tokens) = opts.max_tokens {
            body["options"] = serde_json::json!({ "num_predict": max_tokens });
        }

        let request = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.name().to_string(),
                timeout,
            })?
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Protocol {
                provider: self.name().to_string(),
                message: format!("status {}", response.status()),
            });
        }

        let parsed: GenerateResponse = tokio::time::timeout(timeout, response.json())
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.name().to_string(),
                timeout,
            })?
            .map_err(|e| ProviderError::Protocol {
                provider: self.name().to_string(),
                message: e.to_string(),
            })?;

        debug!("local provider returned {} chars", parsed.response.len());
        Ok(parsed.response)
    }

    async fn available(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        matches!(probe, Ok(r) if r.status().is_success())
    }
}
