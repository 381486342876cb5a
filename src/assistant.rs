//! The external reasoning assistant, as a swappable capability.
//!
//! The assistant is an opaque text-in/text-out RPC: a command-line program
//! that takes a prompt and returns text. `CliAssistant` spawns it as a
//! subprocess with a bounded timeout; `ScriptedAssistant` replays canned
//! responses for tests and the demo walkthrough.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::Fault;

/// Default timeout for a single planning invocation.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for invocations inside the iterative driver.
pub const ITERATIVE_INVOKE_TIMEOUT: Duration = Duration::from_secs(300);

#[async_trait]
pub trait Assistant: Send + Sync {
    /// Send a prompt, get the response text.
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, Fault>;

    /// Describe an image file ("extract visible text, numbers, dates").
    async fn describe_image(&self, path: &Path, timeout: Duration) -> Result<String, Fault>;
}

/// Assistant backed by a CLI binary (`claude` by default).
pub struct CliAssistant {
    cmd: String,
    model: String,
}

impl CliAssistant {
    pub fn new(cmd: impl Into<String>, model: impl Into<String>) -> Self {
        Self { cmd: cmd.into(), model: model.into() }
    }

    async fn run(
        &self,
        extra_args: &[&str],
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, Fault> {
        let mut command = Command::new(&self.cmd);
        command
            .arg("--print")
            .arg("--model")
            .arg(&self.model)
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            Fault::Transient(anyhow::anyhow!("failed to spawn assistant '{}': {e}", self.cmd))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| Fault::Transient(anyhow::anyhow!("failed to write prompt: {e}")))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| Fault::Transient(anyhow::anyhow!("failed to close stdin: {e}")))?;
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| Fault::Transient(anyhow::anyhow!("assistant I/O failed: {e}")))?,
            Err(_) => {
                return Err(Fault::transient(format!(
                    "assistant timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Fault::Transient(anyhow::anyhow!(
                "assistant exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Assistant for CliAssistant {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, Fault> {
        self.run(&[], prompt, timeout).await
    }

    async fn describe_image(&self, path: &Path, timeout: Duration) -> Result<String, Fault> {
        let path_arg = path.to_string_lossy().to_string();
        let prompt = "Describe this image concisely. Extract any visible text, numbers, \
                      dates, and key details. Focus on factual content, not aesthetics.";
        self.run(&["--image", &path_arg], prompt, timeout).await
    }
}

/// Assistant that replays canned responses, in order; the last response
/// repeats once the script runs out. An empty script always errors.
pub struct ScriptedAssistant {
    responses: Mutex<Vec<String>>,
    cursor: Mutex<usize>,
    image_response: String,
}

impl ScriptedAssistant {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            cursor: Mutex::new(0),
            image_response: String::new(),
        }
    }

    pub fn with_image_response(mut self, response: impl Into<String>) -> Self {
        self.image_response = response.into();
        self
    }

    /// How many invocations have been consumed.
    pub fn calls(&self) -> usize {
        *self.cursor.lock().unwrap()
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn invoke(&self, _prompt: &str, _timeout: Duration) -> Result<String, Fault> {
        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Fault::transient("scripted assistant has no responses"));
        }
        let mut cursor = self.cursor.lock().unwrap();
        let index = (*cursor).min(responses.len() - 1);
        *cursor += 1;
        Ok(responses[index].clone())
    }

    async fn describe_image(&self, _path: &Path, _timeout: Duration) -> Result<String, Fault> {
        Ok(self.image_response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_assistant_replays_in_order() {
        let assistant = ScriptedAssistant::new(vec!["one".into(), "two".into()]);
        assert_eq!(assistant.invoke("p", INVOKE_TIMEOUT).await.unwrap(), "one");
        assert_eq!(assistant.invoke("p", INVOKE_TIMEOUT).await.unwrap(), "two");
        // Script exhausted: last response repeats.
        assert_eq!(assistant.invoke("p", INVOKE_TIMEOUT).await.unwrap(), "two");
        assert_eq!(assistant.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_assistant_empty_errors_transient() {
        let assistant = ScriptedAssistant::new(vec![]);
        let err = assistant.invoke("p", INVOKE_TIMEOUT).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cli_assistant_missing_binary_is_transient() {
        let assistant = CliAssistant::new("definitely-not-a-real-binary-xyz", "model");
        let err = assistant.invoke("hi", Duration::from_secs(5)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.reason().contains("spawn"));
    }

    #[tokio::test]
    async fn test_cli_assistant_nonzero_exit_is_transient() {
        // `false` exists on every POSIX system and exits 1.
        let assistant = CliAssistant::new("false", "model");
        let err = assistant.invoke("hi", Duration::from_secs(5)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
