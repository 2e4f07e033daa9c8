//! AI Integration Layer
//!
//! Model access for the scout, planner and writer agents.

pub mod json;
pub mod provider;
pub mod timeout;

pub use json::extract_json_from_response;
pub use provider::{
    ChainConfig, ChainedProvider, ClaudeCodeProvider, LlmProvider, LlmResponse, OpenAiProvider,
    ProviderChain, ProviderConfig, ResponseMetadata, ResponseTiming, SharedProvider, TokenUsage,
    build_provider, create_provider,
};
pub use timeout::{with_timeout, with_timeout_map};
