//! Regeneration Planner
//!
//! Decides which registered documents are stale. Staleness is per document:
//! each one is diffed against its own revision marker, since documents are
//! generated at different times. The final writing order is computed once the
//! agent planner has added new documents (see [`order_work`]).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{DependencyGraph, order_by_references};
use crate::source::ChangeDetector;
use crate::storage::VersionStore;
use crate::types::{
    DocError, Document, DocumentId, Result, VersionReason, slugify, validate_collection,
};

const MAX_REPORTED_FILES: usize = 20;

/// Why a document is in the work list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StaleReason {
    /// Planned for the first time, or no version record exists
    NeverGenerated,
    /// Declared dependencies intersect the change set
    SourceChanged { files: Vec<String> },
    /// Revision marker missing from history (rewritten history)
    UnknownRevision { revision: String },
    /// Operator asked for it
    Forced,
}

impl StaleReason {
    /// Reason code for the version record a successful write appends.
    pub fn version_reason(&self) -> VersionReason {
        match self {
            Self::NeverGenerated => VersionReason::InitialGeneration,
            Self::Forced => VersionReason::ManualRegeneration,
            Self::SourceChanged { .. } | Self::UnknownRevision { .. } => {
                VersionReason::SourceChanged
            }
        }
    }
}

/// Documents the operator forces regardless of staleness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForceSet {
    #[default]
    None,
    Ids(BTreeSet<DocumentId>),
    All,
}

impl ForceSet {
    pub fn contains(&self, id: &DocumentId) -> bool {
        match self {
            Self::None => false,
            Self::Ids(ids) => ids.contains(id),
            Self::All => true,
        }
    }
}

/// Which documents a run may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Slugged collection prefix; empty means everything
    prefix: String,
    doc_type: Option<String>,
}

impl Scope {
    pub fn new(collection_prefix: &str, doc_type: Option<&str>) -> Result<Self> {
        let prefix = validate_collection(collection_prefix)?
            .split('/')
            .map(slugify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Ok(Self {
            prefix,
            doc_type: doc_type
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn includes(&self, id: &DocumentId, doc_type: &str) -> bool {
        let in_collection = self.prefix.is_empty()
            || id
                .as_str()
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'));
        let type_matches = self
            .doc_type
            .as_deref()
            .is_none_or(|t| t.eq_ignore_ascii_case(doc_type));
        in_collection && type_matches
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleDocument {
    pub id: DocumentId,
    pub reason: StaleReason,
}

/// Staleness of every in-scope registered document.
#[derive(Debug, Clone, Default)]
pub struct StalenessReport {
    /// Stale documents in registry order
    pub stale: Vec<StaleDocument>,
    /// In-scope documents left untouched
    pub fresh: Vec<DocumentId>,
    pub warnings: Vec<String>,
}

impl StalenessReport {
    pub fn is_stale(&self, id: &DocumentId) -> bool {
        self.stale.iter().any(|s| &s.id == id)
    }

    pub fn reason(&self, id: &DocumentId) -> Option<&StaleReason> {
        self.stale.iter().find(|s| &s.id == id).map(|s| &s.reason)
    }

    /// Distinct revision markers of stale documents with a usable marker.
    pub fn stale_revisions<'a>(&self, documents: &'a [Document]) -> BTreeSet<&'a str> {
        documents
            .iter()
            .filter(|d| {
                matches!(
                    self.reason(&d.id),
                    Some(StaleReason::SourceChanged { .. } | StaleReason::Forced)
                )
            })
            .map(|d| d.revision.as_str())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

pub struct RegenerationPlanner<'a> {
    detector: &'a ChangeDetector,
    graph: &'a DependencyGraph,
    versions: &'a VersionStore,
}

impl<'a> RegenerationPlanner<'a> {
    pub fn new(
        detector: &'a ChangeDetector,
        graph: &'a DependencyGraph,
        versions: &'a VersionStore,
    ) -> Self {
        Self {
            detector,
            graph,
            versions,
        }
    }

    /// Classify every in-scope registered document as stale or fresh.
    pub async fn assess(
        &self,
        documents: &[Document],
        scope: &Scope,
        force: &ForceSet,
    ) -> Result<StalenessReport> {
        let mut report = StalenessReport::default();

        for doc in documents {
            if !scope.includes(&doc.id, &doc.meta.doc_type) {
                continue;
            }

            match self.staleness(doc, force, &mut report.warnings).await? {
                Some(reason) => {
                    debug!(document = %doc.id, ?reason, "Document is stale");
                    report.stale.push(StaleDocument {
                        id: doc.id.clone(),
                        reason,
                    });
                }
                None => {
                    debug!(document = %doc.id, revision = %doc.revision, "Document is fresh");
                    report.fresh.push(doc.id.clone());
                }
            }
        }

        Ok(report)
    }

    async fn staleness(
        &self,
        doc: &Document,
        force: &ForceSet,
        warnings: &mut Vec<String>,
    ) -> Result<Option<StaleReason>> {
        if force.contains(&doc.id) {
            return Ok(Some(StaleReason::Forced));
        }
        if !self.versions.has_history(&doc.id)? {
            return Ok(Some(StaleReason::NeverGenerated));
        }

        let changes = match self.detector.changes_since(Some(&doc.revision)).await {
            Ok(changes) => changes,
            Err(DocError::UnknownRevision { revision }) => {
                let message = format!(
                    "{}: revision {} not found in history; regenerating unconditionally",
                    doc.id, revision
                );
                warn!("{}", message);
                warnings.push(message);
                return Ok(Some(StaleReason::UnknownRevision { revision }));
            }
            Err(e) => return Err(e),
        };

        if !self.graph.is_affected(&doc.id, &changes) {
            return Ok(None);
        }
        let mut files = self.graph.matched_files(&doc.id, &changes);
        files.truncate(MAX_REPORTED_FILES);
        Ok(Some(StaleReason::SourceChanged { files }))
    }
}

/// Order the work list so referents are written before their referrers.
///
/// Cycles fall back to declaration order; the returned warning names them.
pub fn order_work(
    work: &[DocumentId],
    references: &BTreeMap<DocumentId, BTreeSet<DocumentId>>,
) -> (Vec<DocumentId>, Option<String>) {
    let ordering = order_by_references(work, references);
    if ordering.cycle.is_empty() {
        return (ordering.order, None);
    }

    let members: Vec<&str> = ordering.cycle.iter().map(DocumentId::as_str).collect();
    let message = format!(
        "cross-reference cycle among {}; using declaration order",
        members.join(", ")
    );
    warn!("{}", message);
    (ordering.order, Some(message))
}
