//! Provider Chain
//!
//! Tries providers in order. Each provider gets a bounded number of attempts
//! with exponential backoff plus jitter; errors are routed by category to
//! decide between retrying, moving to the next provider, or stopping.

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::{LlmProvider, LlmResponse, ProviderConfig, SharedProvider};
use crate::constants::chain as chain_constants;
use crate::types::{DocError, ErrorCategory, ErrorClassifier, Result};

/// Provider with per-provider retry budget
#[derive(Clone)]
pub struct ChainedProvider {
    pub provider: SharedProvider,
    pub max_retries: u8,
}

impl ChainedProvider {
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            max_retries: chain_constants::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Maximum total attempts across all providers
    pub max_total_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_total_attempts: chain_constants::MAX_TOTAL_ATTEMPTS,
            base_delay: Duration::from_millis(chain_constants::BASE_DELAY_MS),
            max_delay: Duration::from_secs(chain_constants::MAX_DELAY_SECS),
            backoff_factor: chain_constants::BACKOFF_FACTOR,
        }
    }
}

#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<ChainedProvider>,
    config: ChainConfig,
}

impl ProviderChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            providers: Vec::new(),
            config,
        }
    }

    pub fn add_provider(mut self, provider: ChainedProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build chain from provider configs, in priority order
    pub fn from_configs(configs: &[ProviderConfig], config: ChainConfig) -> Result<Self> {
        let mut chain = Self::new(config);
        for provider_config in configs {
            let provider = super::create_provider(provider_config)?;
            chain.providers.push(ChainedProvider::new(provider));
        }
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[instrument(skip(self, prompt, schema), fields(providers = self.providers.len()))]
    pub async fn execute(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        if self.providers.is_empty() {
            return Err(DocError::Config(
                "No providers configured in chain".to_string(),
            ));
        }

        let started = Instant::now();
        let mut total_attempts = 0usize;
        let mut last_error: Option<DocError> = None;

        for entry in &self.providers {
            let provider_name = entry.provider.name().to_string();
            let mut current_delay = self.config.base_delay;

            for attempt in 1..=entry.max_retries {
                if total_attempts >= self.config.max_total_attempts {
                    break;
                }
                total_attempts += 1;

                debug!(
                    provider = %provider_name,
                    attempt,
                    total_attempts,
                    "Chain attempt"
                );

                let err = match entry.provider.generate(prompt, schema).await {
                    Ok(response) => {
                        info!(
                            provider = %provider_name,
                            attempts = total_attempts,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Chain succeeded"
                        );
                        return Ok(response);
                    }
                    Err(err) => err,
                };

                let classified = ErrorClassifier::classify(&err.to_string(), &provider_name);
                warn!(
                    provider = %provider_name,
                    attempt,
                    error = %err,
                    category = %classified.category,
                    "Provider failed"
                );
                last_error = Some(err);

                let last_attempt = attempt >= entry.max_retries;
                match classified.category {
                    ErrorCategory::Auth | ErrorCategory::TokenLimit | ErrorCategory::Unavailable => {
                        info!(provider = %provider_name, "Trying next provider");
                        break;
                    }
                    ErrorCategory::BadRequest => {
                        warn!("Bad request, stopping chain");
                        return Err(last_error.unwrap_or_else(|| {
                            DocError::LlmApi("Bad request with unknown error".to_string())
                        }));
                    }
                    _ if last_attempt => {}
                    ErrorCategory::RateLimit => {
                        let wait = classified
                            .retry_after
                            .unwrap_or(self.config.max_delay)
                            .min(self.config.max_delay);
                        info!(wait_secs = wait.as_secs(), "Rate limited, waiting before retry");
                        sleep(wait).await;
                    }
                    ErrorCategory::ParseError => {
                        sleep(classified.recommended_delay().min(current_delay)).await;
                    }
                    ErrorCategory::Network | ErrorCategory::Transient | ErrorCategory::Unknown => {
                        let delay = current_delay + random_jitter(current_delay);
                        debug!(delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                        sleep(delay).await;
                        current_delay = calculate_backoff(
                            current_delay,
                            self.config.backoff_factor,
                            self.config.max_delay,
                        );
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DocError::LlmApi("All providers in chain failed".to_string())))
    }
}

#[async_trait]
impl LlmProvider for ProviderChain {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        self.execute(prompt, schema).await
    }

    fn name(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.provider.name())
            .unwrap_or("provider-chain")
    }

    fn model(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.provider.model())
            .unwrap_or("unknown")
    }

    async fn health_check(&self) -> Result<bool> {
        for entry in &self.providers {
            if entry.provider.health_check().await.unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

fn calculate_backoff(current: Duration, factor: f32, max: Duration) -> Duration {
    let next = Duration::from_secs_f32(current.as_secs_f32() * factor);
    std::cmp::min(next, max)
}
