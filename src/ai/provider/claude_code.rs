//! Claude Code CLI Provider
//!
//! Spawns the local `claude` CLI in print mode and reads its JSON envelope.
//! Single-shot: retries belong to the ProviderChain.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

use super::{
    LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming, TokenUsage,
};
use crate::ai::timeout::with_timeout_map;
use crate::types::{DocError, Result};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub struct ClaudeCodeProvider {
    model: String,
    timeout: Duration,
    temperature: f32,
}

impl ClaudeCodeProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
        }
    }

    fn command(&self, prompt: &str, schema: &Value) -> Result<Command> {
        let mut cmd = Command::new("claude");
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(&self.model)
            .env("CLAUDE_CODE_TEMPERATURE", self.temperature.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !schema.is_null() {
            cmd.arg("--json-schema").arg(serde_json::to_string(schema)?);
        }
        Ok(cmd)
    }

    /// Pull the structured payload out of the CLI's JSON envelope.
    fn extract_content(envelope: &Value) -> Result<Value> {
        if let Some(structured) = envelope.get("structured_output") {
            return Ok(structured.clone());
        }
        match envelope.get("result") {
            Some(result) if result.is_object() || result.is_array() => Ok(result.clone()),
            Some(Value::String(text)) => crate::ai::extract_json_from_response(text),
            _ => Err(DocError::LlmApi(
                "No structured output in Claude Code response".to_string(),
            )),
        }
    }

    fn extract_usage(envelope: &Value) -> TokenUsage {
        let field = |name: &str| {
            envelope
                .get("usage")
                .and_then(|u| u.get(name))
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32
        };
        TokenUsage {
            input_tokens: field("input_tokens"),
            output_tokens: field("output_tokens"),
            cache_read_tokens: field("cache_read_input_tokens"),
            cache_write_tokens: field("cache_creation_input_tokens"),
        }
    }
}

#[async_trait]
impl LlmProvider for ClaudeCodeProvider {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        info!(model = %self.model, "Generating with Claude Code CLI");
        let started = Instant::now();

        let child = self.command(prompt, schema)?.spawn().map_err(|e| {
            DocError::LlmApi(format!(
                "Failed to spawn Claude Code CLI: {}. Is it installed?",
                e
            ))
        })?;

        let output = with_timeout_map(self.timeout, child.wait_with_output(), "claude-code call")
            .await?
            .map_err(|e| DocError::LlmApi(format!("Claude Code execution failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            if let Ok(envelope) = serde_json::from_str::<Value>(&stdout)
                && envelope
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            {
                let message = envelope
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown API error");
                return Err(DocError::LlmApi(format!("Claude Code API error: {}", message)));
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                "Process exited with non-zero status"
            } else {
                stderr.trim()
            };
            return Err(DocError::LlmApi(format!("Claude Code failed: {}", message)));
        }

        let envelope: Value = serde_json::from_str(&stdout).map_err(|e| {
            DocError::LlmApi(format!("Failed to parse Claude Code output: {}", e))
        })?;
        debug!("Received Claude Code envelope");

        Ok(LlmResponse {
            content: Self::extract_content(&envelope)?,
            usage: Self::extract_usage(&envelope),
            cost_usd: envelope
                .get("total_cost_usd")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            timing: ResponseTiming {
                total_ms: started.elapsed().as_millis() as u64,
                api_ms: envelope.get("duration_api_ms").and_then(Value::as_u64),
            },
            metadata: ResponseMetadata {
                model: self.model.clone(),
                provider: "claude-code".to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        "claude-code"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let output = Command::new("claude")
            .arg("--version")
            .output()
            .await
            .map_err(|e| DocError::LlmApi(format!("Claude Code not found: {}", e)))?;
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_content_prefers_structured_output() {
        let envelope = json!({
            "structured_output": {"body": "# Overview"},
            "result": "ignored"
        });
        let content = ClaudeCodeProvider::extract_content(&envelope).unwrap();
        assert_eq!(content["body"], "# Overview");
    }

    #[test]
    fn test_extract_content_from_fenced_result() {
        let envelope = json!({"result": "```json\n{\"documents\": []}\n```"});
        let content = ClaudeCodeProvider::extract_content(&envelope).unwrap();
        assert!(content["documents"].is_array());

        assert!(ClaudeCodeProvider::extract_content(&json!({"usage": {}})).is_err());
    }

    #[test]
    fn test_extract_usage() {
        let envelope = json!({
            "usage": {
                "input_tokens": 1000,
                "output_tokens": 500,
                "cache_read_input_tokens": 100
            }
        });
        let usage = ClaudeCodeProvider::extract_usage(&envelope);
        assert_eq!(usage.total(), 1500);
        assert_eq!(usage.cache_read_tokens, 100);
        assert_eq!(usage.cache_write_tokens, 0);
    }
}
