use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "local_http", "subprocess", or "remote_http".
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Command line for the subprocess provider; first element is the
    /// program, the rest are arguments.
    pub command: Vec<String>,
    pub timeout_ms: u64,
    pub max_tokens: u32,
    /// Secondary provider the remote variant falls back to.
    pub fallback_provider: Option<String>,
    /// Hard cap applied when rendering session transcripts.
    pub transcript_char_cap: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "local_http".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.1".to_string(),
            command: Vec::new(),
            timeout_ms: 120_000,
            max_tokens: 4096,
            fallback_provider: None,
            transcript_char_cap: 200_000,
        }
    }
}
