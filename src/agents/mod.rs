//! Scout, planner and writer collaborators.
//!
//! The regeneration core sees these only through the three traits below.
//! Scouts explore one focus area each and run in parallel; the planner is a
//! single reasoning step over all scout reports; writers produce one
//! document body each. Every output is untrusted: dependency paths are
//! validated by the graph, titles are sanitized before reuse in prompts.

mod llm;
mod prompts;
mod safety;

pub use llm::{LlmPlanner, LlmScout, LlmWriter};
pub use safety::{detect_injection, sanitize_title};

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, Result};

// =============================================================================
// Shared Context
// =============================================================================

/// What the agents know about the repository being documented.
#[derive(Debug, Clone, Default)]
pub struct RepositoryContext {
    /// Display name, e.g. `acme/widgets`
    pub name: String,
    /// Reference recorded in trailers (URL or local path)
    pub reference: String,
    pub head_revision: String,
    /// Tracked files, used as a manifest in scout prompts
    pub files: Vec<String>,
}

/// An already generated document, summarized for prompts.
#[derive(Debug, Clone)]
pub struct ExistingDocument {
    pub id: DocumentId,
    pub title: String,
    pub doc_type: String,
    /// Leading excerpt of the body
    pub snippet: String,
}

// =============================================================================
// Scout
// =============================================================================

#[derive(Debug, Clone)]
pub struct ScoutRequest {
    pub repository: Arc<RepositoryContext>,
    pub focus: String,
    /// Changed paths when exploring a regeneration; `None` on a first run
    pub changed_files: Option<Vec<String>>,
    pub existing: Arc<Vec<ExistingDocument>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoutReport {
    pub focus: String,
    pub report: String,
    pub source_dependencies: BTreeSet<String>,
}

#[async_trait]
pub trait Scout: Send + Sync {
    async fn explore(&self, request: &ScoutRequest) -> Result<ScoutReport>;
}

// =============================================================================
// Planner
// =============================================================================

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub repository: Arc<RepositoryContext>,
    /// Collection prefix every planned document is placed under
    pub collection_prefix: String,
    pub reports: Arc<Vec<ScoutReport>>,
    pub existing: Arc<Vec<ExistingDocument>>,
}

/// One document in the planner's blueprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    pub document_id: DocumentId,
    pub title: String,
    pub doc_type: String,
    /// Full collection path (prefix plus planner folder)
    pub collection: String,
    pub outline: String,
    /// Titles or ids of documents this one should link to
    pub references: Vec<String>,
    /// Files the planner expects the writer to rely on
    pub key_files: Vec<String>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Ordered blueprint; declaration order is the tie-break for writing order.
    async fn plan(&self, request: &PlanRequest) -> Result<Vec<PlanEntry>>;
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub repository: Arc<RepositoryContext>,
    pub document_id: DocumentId,
    pub title: String,
    pub doc_type: String,
    pub outline: String,
    pub reports: Arc<Vec<ScoutReport>>,
    /// (id, title) pairs the body may link to with `[[wikilinks]]`
    pub link_targets: Vec<(DocumentId, String)>,
    /// Body of the currently live version, if any
    pub previous_body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOutput {
    pub body: String,
    pub source_dependencies: BTreeSet<String>,
}

#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, request: &WriteRequest) -> Result<WriterOutput>;
}

/// The three collaborators a run needs.
#[derive(Clone)]
pub struct Agents {
    pub scout: Arc<dyn Scout>,
    pub planner: Arc<dyn Planner>,
    pub writer: Arc<dyn Writer>,
}

impl Agents {
    /// LLM-backed agents sharing one provider.
    pub fn from_provider(provider: crate::ai::SharedProvider) -> Self {
        Self {
            scout: Arc::new(LlmScout::new(provider.clone())),
            planner: Arc::new(LlmPlanner::new(provider.clone())),
            writer: Arc::new(LlmWriter::new(provider)),
        }
    }
}
