//! docweave - Incremental, Regeneration-Aware Documentation
//!
//! Generates markdown documentation for a git repository with LLM agents and,
//! on later runs, rewrites only the documents whose source dependencies
//! changed. Human edits to generated files are never overwritten.
//!
//! ## Core Features
//!
//! - **Change detection**: git diff between the revision a document was
//!   generated at and the current head
//! - **Dependency graph**: document → source path / glob edges decide staleness
//! - **Version history**: append-only records in SQLite; the registry can be
//!   rebuilt from history at any time
//! - **Conflict preservation**: edited files keep their content; the proposed
//!   rewrite is kept in history for later reconciliation
//!
//! ## Quick Start
//!
//! ```ignore
//! use docweave::{Agents, Orchestrator, RegenerateRequest, RunOptions, StateStore};
//!
//! let store = StateStore::open_in_memory()?;
//! let repo = Arc::new(GitRepository::open(".", "https://github.com/acme/widgets")?);
//! let agents = Agents::from_provider(build_provider(&config.llm)?);
//! let orchestrator = Orchestrator::new(store, repo, agents, RunOptions::from_config(&config, out));
//! let outcome = orchestrator.regenerate(&RegenerateRequest::default()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`source`]: repository access and change detection
//! - [`graph`]: document dependency and cross-reference graphs
//! - [`storage`]: registry, version history, commit locks
//! - [`regen`]: staleness planning, orchestration, conflict handling
//! - [`agents`]: scout / planner / writer collaborators
//! - [`ai`]: LLM providers with retry and fallback

pub mod agents;
pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod graph;
pub mod regen;
pub mod source;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};
pub use types::error::{DocError, ErrorCategory, Result, ResultExt};
pub use types::{Document, DocumentId, DocumentMeta, RunId, VersionReason, VersionRecord};

pub use storage::{Database, SharedDatabase, StateStore};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use agents::Agents;
pub use regen::{
    ConflictReport, ForceSet, Operator, Orchestrator, RegenerateOutcome, RegenerateRequest,
    Resolution, RunOptions,
};
pub use source::{ChangeDetector, GitRepository, RepositorySource};

pub use ai::{LlmProvider, ProviderChain, SharedProvider, build_provider, with_timeout};
