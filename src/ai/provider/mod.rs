//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for structured (JSON) output generation.
//! Scout, planner and writer agents talk to models only through this trait.
//!
//! ## Modules
//!
//! - `chain`: retry with backoff, then fallback to the next provider

mod chain;
mod claude_code;
mod openai;

pub use chain::{ChainConfig, ChainedProvider, ProviderChain};
pub use claude_code::ClaudeCodeProvider;
pub use openai::OpenAiProvider;

pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::types::{DocError, Result};

// =============================================================================
// LLM Response
// =============================================================================

/// LLM response: structured content plus usage reported by the provider
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Value,
    pub usage: TokenUsage,
    /// Cost in USD when the provider reports one
    pub cost_usd: f64,
    pub timing: ResponseTiming,
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Response with content only (usage and cost unknown)
    pub fn content_only(content: Value) -> Self {
        Self {
            content,
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn from_openai(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Wall clock time in milliseconds
    pub total_ms: u64,
    /// API processing time reported by the provider
    pub api_ms: Option<u64>,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
            api_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: String,
}

/// Shared provider handle used by every agent in a run.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one LLM provider
///
/// API keys are never serialized and are redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "claude-code" or "openai"
    pub provider: String,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_max_tokens() -> usize {
    8192
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "claude-code".to_string(),
            model: None,
            timeout_secs: 300,
            temperature: 0.0,
            api_key: None,
            api_base: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl ProviderConfig {
    /// Primary provider from the `[llm]` section
    pub fn primary(llm: &LlmConfig) -> Self {
        Self {
            provider: llm.provider.clone(),
            model: Some(llm.model.clone()).filter(|m| !m.is_empty()),
            timeout_secs: llm.timeout_secs,
            temperature: llm.temperature,
            ..Default::default()
        }
    }

    /// Fallback provider, if one is configured
    pub fn fallback(llm: &LlmConfig) -> Option<Self> {
        let provider = llm.fallback_provider.clone()?;
        Some(Self {
            provider,
            model: llm.fallback_model.clone(),
            timeout_secs: llm.timeout_secs,
            temperature: llm.temperature,
            ..Default::default()
        })
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate structured output constrained by a JSON Schema
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn health_check(&self) -> Result<bool>;
}

/// Create a single provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "claude-code" => Ok(Arc::new(ClaudeCodeProvider::new(config.clone()))),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        _ => Err(DocError::Config(format!(
            "Unknown provider: {}. Supported: claude-code, openai",
            config.provider
        ))),
    }
}

/// Build the provider used by a run: primary, then optional fallback,
/// wrapped in a retrying chain.
pub fn build_provider(llm: &LlmConfig) -> Result<SharedProvider> {
    let mut configs = vec![ProviderConfig::primary(llm)];
    configs.extend(ProviderConfig::fallback(llm));
    Ok(Arc::new(ProviderChain::from_configs(
        &configs,
        ChainConfig::default(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_configs_from_llm_section() {
        let mut llm = LlmConfig::default();
        assert!(ProviderConfig::fallback(&llm).is_none());

        llm.fallback_provider = Some("openai".to_string());
        llm.fallback_model = Some("gpt-4o".to_string());
        let fallback = ProviderConfig::fallback(&llm).unwrap();
        assert_eq!(fallback.provider, "openai");
        assert_eq!(fallback.model.as_deref(), Some("gpt-4o"));

        let primary = ProviderConfig::primary(&llm);
        assert_eq!(primary.provider, "claude-code");
        assert_eq!(primary.timeout_secs, llm.timeout_secs);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ProviderConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_provider(&config), Err(DocError::Config(_))));
    }
}
