//! Subprocess provider: spawn a CLI, write the prompt to stdin, collect
//! stdout, kill on timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use mnemon_core::errors::ProviderError;
use mnemon_core::traits::{GenerateOptions, LlmProvider};

use super::effective_timeout;

pub struct SubprocessProvider {
    program: String,
    args: Vec<String>,
    default_timeout: Duration,
}

impl SubprocessProvider {
    /// `command` is the program followed by its arguments.
    pub fn new(command: &[String], timeout: Duration) -> Result<Self, ProviderError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ProviderError::Subprocess("empty command line".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            default_timeout: timeout,
        })
    }
}

#[async_trait]
impl LlmProvider for SubprocessProvider {
    fn name(&self) -> &str {
        "subprocess"
    }

    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String, ProviderError> {
        let timeout = effective_timeout(&opts, self.default_timeout);

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            // Dropping the wait future on timeout must not leak the child.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Subprocess(format!("spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ProviderError::Subprocess(format!("write stdin: {e}")))?;
            // Dropping stdin closes the pipe so the child sees EOF.
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| ProviderError::Subprocess(format!("collect output: {e}")))?
            }
            Err(_) => {
                // kill_on_drop already reaped the child.
                warn!("subprocess provider timed out after {timeout:?}");
                return Err(ProviderError::Timeout {
                    provider: self.name().to_string(),
                    timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(ProviderError::Subprocess(format!(
                "exit status {}",
                output.status
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ProviderError::Subprocess(format!("non-utf8 output: {e}")))
    }

    async fn available(&self) -> bool {
        tokio::process::Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
