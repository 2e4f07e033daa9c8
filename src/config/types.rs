//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/docweave/) and project (.docweave/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{commit, layout, network, pipeline};
use crate::types::{DocError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Project-specific settings
    pub project: ProjectConfig,

    /// Regeneration pipeline settings
    pub generation: GenerationConfig,

    /// Scout exploration settings
    pub scouts: ScoutConfig,

    /// LLM provider settings
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            project: ProjectConfig::default(),
            generation: GenerationConfig::default(),
            scouts: ScoutConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `DocError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(DocError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(DocError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.generation.scout_concurrency == 0 || self.generation.writer_concurrency == 0 {
            return Err(DocError::Config(
                "generation concurrency limits must be greater than 0".to_string(),
            ));
        }

        if self.generation.agent_timeout_secs == 0 {
            return Err(DocError::Config(
                "generation agent_timeout_secs must be greater than 0".to_string(),
            ));
        }

        crate::types::validate_collection(&self.generation.collection)
            .map_err(|e| DocError::Config(format!("generation.collection: {}", e)))?;

        Ok(())
    }
}

// =============================================================================
// Project Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name (defaults to directory name)
    pub name: Option<String>,

    /// Source repository reference written into trailers (URL or local path)
    pub repo_url: Option<String>,
}

// =============================================================================
// Generation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Document output directory (relative to .docweave/)
    pub output_dir: PathBuf,

    /// Default collection prefix for new documents
    pub collection: String,

    /// Maximum concurrent scouts
    pub scout_concurrency: usize,

    /// Maximum concurrent writers
    pub writer_concurrency: usize,

    /// Delay before retrying a contended commit lock (milliseconds)
    pub lock_retry_delay_ms: u64,

    /// Age after which a commit lock is treated as abandoned (seconds)
    pub stale_lock_secs: u64,

    /// Timeout for each scout/planner/writer call (seconds)
    pub agent_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(layout::OUTPUT_DIR),
            collection: String::new(),
            scout_concurrency: pipeline::SCOUT_CONCURRENCY,
            writer_concurrency: pipeline::WRITER_CONCURRENCY,
            lock_retry_delay_ms: commit::LOCK_RETRY_DELAY_MS,
            stale_lock_secs: commit::STALE_LOCK_SECS,
            agent_timeout_secs: pipeline::AGENT_TIMEOUT_SECS,
        }
    }
}

impl GenerationConfig {
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

// =============================================================================
// Scout Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Focus areas explored in parallel on a first run
    pub focus_areas: Vec<String>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            focus_areas: pipeline::DEFAULT_FOCUS_AREAS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name
    pub provider: String,

    /// Model name
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Temperature for LLM generation (0.0 = deterministic)
    pub temperature: f32,

    /// Fallback provider for retry chain
    pub fallback_provider: Option<String>,

    /// Fallback model for retry chain
    pub fallback_model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "claude-code".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.0,
            fallback_provider: None,
            fallback_model: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
