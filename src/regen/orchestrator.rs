//! Pipeline Orchestrator
//!
//! One run of the three-tier pipeline against the current head revision:
//!
//! ```text
//! registry ─► staleness ─► scouts (parallel) ─► planner ─► merge ─► writers (parallel)
//!                                                                  │
//!                                               commit (lock, verdict, record, rename)
//! ```
//!
//! Staleness is recomputed from the registry on every run, so an aborted run
//! loses nothing that was already committed. When nothing is stale and the
//! registry already covers the scope, no agent is invoked at all.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::cancel::CancelSignal;
use super::commit::{CommitOutcome, Committer, Proposal};
use super::conflict::ConflictReport;
use super::planner::{ForceSet, RegenerationPlanner, Scope, StaleReason, StalenessReport, order_work};
use super::trailer::strip_trailer;
use crate::agents::{
    Agents, ExistingDocument, PlanEntry, PlanRequest, RepositoryContext, ScoutReport,
    ScoutRequest, WriteRequest, Writer, WriterOutput,
};
use crate::ai::with_timeout;
use crate::config::Config;
use crate::constants::pipeline;
use crate::graph::{DependencyGraph, ReferenceIndex, extract_wikilinks};
use crate::source::{ChangeDetector, ChangeSet, RepositorySource};
use crate::storage::StateStore;
use crate::types::{DocError, Document, DocumentId, DocumentMeta, Result, RunId, truncate_chars};

const DIFF_FOCUS: &str =
    "changes since last generation: new features, removed features, facts that are now wrong";

// =============================================================================
// Run Inputs and Outputs
// =============================================================================

/// Arguments of one `regenerate` call.
///
/// The repository itself is bound when the orchestrator is built.
#[derive(Debug, Clone, Default)]
pub struct RegenerateRequest {
    /// Collection prefix new documents are placed under; also narrows the run
    pub collection_prefix: String,
    pub doc_type_filter: Option<String>,
    pub force: ForceSet,
}

/// Structured summary of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegenerateOutcome {
    pub run_id: String,
    pub head_revision: String,
    pub written: Vec<DocumentId>,
    pub skipped_conflicts: Vec<DocumentId>,
    /// In-scope documents left untouched, sorted by id
    pub unchanged: Vec<DocumentId>,
    pub warnings: Vec<String>,
    pub conflicts: Vec<ConflictReport>,
}

impl RegenerateOutcome {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub scout_concurrency: usize,
    pub writer_concurrency: usize,
    pub agent_timeout: Duration,
    pub lock_retry_delay: Duration,
    /// Focus areas for first-time exploration
    pub focus_areas: Vec<String>,
}

impl RunOptions {
    pub fn from_config(config: &Config, output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            scout_concurrency: config.generation.scout_concurrency.max(1),
            writer_concurrency: config.generation.writer_concurrency.max(1),
            agent_timeout: config.generation.agent_timeout(),
            lock_retry_delay: config.generation.lock_retry_delay(),
            focus_areas: config.scouts.focus_areas.clone(),
        }
    }
}

// =============================================================================
// Work Items
// =============================================================================

/// One document to write this run.
#[derive(Debug, Clone)]
struct WorkItem {
    id: DocumentId,
    title: String,
    doc_type: String,
    collection: String,
    outline: String,
    /// Raw link targets (ids or titles) declared by the planner or stored
    references: Vec<String>,
    /// Fallback dependencies when the writer declares none
    key_files: Vec<String>,
    reason: StaleReason,
    previous: Option<Document>,
}

impl WorkItem {
    fn from_plan(entry: PlanEntry, reason: StaleReason, previous: Option<Document>) -> Self {
        Self {
            id: entry.document_id,
            title: entry.title,
            doc_type: entry.doc_type,
            collection: entry.collection,
            outline: entry.outline,
            references: entry.references,
            key_files: entry.key_files,
            reason,
            previous,
        }
    }

    fn from_registry(doc: &Document, reason: StaleReason) -> Self {
        let mut references: Vec<String> = doc.meta.references.iter().cloned().collect();
        references.extend(extract_wikilinks(&doc.content));
        Self {
            id: doc.id.clone(),
            title: doc.meta.title.clone(),
            doc_type: doc.meta.doc_type.clone(),
            collection: doc.meta.collection.clone(),
            outline: doc.meta.outline.clone(),
            references,
            key_files: doc.meta.dependencies.iter().cloned().collect(),
            reason,
            previous: Some(doc.clone()),
        }
    }
}

/// Merge the planner's blueprint with the stale set.
///
/// Plan entries for fresh registered documents are dropped; new entries in
/// scope are always written; stale documents the planner omitted are
/// rewritten from their stored outline. Declaration order: plan first.
fn merge_work(
    plan: Vec<PlanEntry>,
    documents: &[Document],
    staleness: &StalenessReport,
    scope: &Scope,
) -> Vec<WorkItem> {
    let registered: HashMap<&DocumentId, &Document> =
        documents.iter().map(|d| (&d.id, d)).collect();
    let mut planned = HashSet::new();
    let mut items = Vec::new();

    for entry in plan {
        let id = entry.document_id.clone();
        match registered.get(&id) {
            Some(doc) => match staleness.reason(&id) {
                Some(reason) => {
                    planned.insert(id);
                    items.push(WorkItem::from_plan(entry, reason.clone(), Some((*doc).clone())));
                }
                None => debug!(document = %id, "Planned document is fresh; skipping"),
            },
            None if scope.includes(&id, &entry.doc_type) => {
                planned.insert(id);
                items.push(WorkItem::from_plan(entry, StaleReason::NeverGenerated, None));
            }
            None => debug!(document = %id, "Planned document outside scope; skipping"),
        }
    }

    for stale in &staleness.stale {
        if planned.contains(&stale.id) {
            continue;
        }
        if let Some(doc) = registered.get(&stale.id) {
            items.push(WorkItem::from_registry(doc, stale.reason.clone()));
        }
    }

    items
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    store: StateStore,
    source: Arc<dyn RepositorySource>,
    agents: Agents,
    options: RunOptions,
    cancel: CancelSignal,
    run_id: RunId,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        source: Arc<dyn RepositorySource>,
        agents: Agents,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            source,
            agents,
            options,
            cancel: CancelSignal::new(),
            run_id: RunId::generate(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Bring every in-scope document up to date with the head revision.
    ///
    /// Per-document failures become warnings; only store-level failures
    /// abort the run.
    #[instrument(skip_all, fields(run_id = %self.run_id, collection = %request.collection_prefix))]
    pub async fn regenerate(&self, request: &RegenerateRequest) -> Result<RegenerateOutcome> {
        let scope = Scope::new(&request.collection_prefix, request.doc_type_filter.as_deref())?;
        let detector = ChangeDetector::new(self.source.clone()).await?;
        let head = detector.head().to_string();

        let mut outcome = RegenerateOutcome {
            run_id: self.run_id.to_string(),
            head_revision: head.clone(),
            ..Default::default()
        };

        let documents = self.store.registry.list()?;
        let graph = DependencyGraph::from_documents(&documents);
        let staleness = RegenerationPlanner::new(&detector, &graph, &self.store.versions)
            .assess(&documents, &scope, &request.force)
            .await?;
        outcome.warnings.extend(staleness.warnings.iter().cloned());
        outcome.unchanged = staleness.fresh.clone();

        let first_run = staleness.stale.is_empty() && staleness.fresh.is_empty();
        info!(
            head = %head,
            registered = documents.len(),
            stale = staleness.stale.len(),
            fresh = staleness.fresh.len(),
            first_run,
            "Assessed staleness"
        );

        if !first_run && staleness.stale.is_empty() {
            info!("Everything in scope is current; nothing to regenerate");
            return Ok(outcome);
        }

        // Exploration
        let in_scope: Vec<&Document> = documents
            .iter()
            .filter(|d| scope.includes(&d.id, &d.meta.doc_type))
            .collect();
        let repository = Arc::new(self.repository_context(&head, &mut outcome).await);
        let existing = Arc::new(existing_documents(&in_scope));
        let changed = if first_run {
            None
        } else {
            self.changed_files(&detector, &documents, &staleness, &mut outcome)
                .await
        };

        let focus_areas = if first_run {
            self.options.focus_areas.clone()
        } else {
            regeneration_focus(&documents, &staleness, changed.is_some())
        };
        let reports = Arc::new(
            self.explore(&repository, &existing, focus_areas, changed, &mut outcome)
                .await,
        );

        if let Err(e) = self.cancel.check("planning") {
            outcome.warn(format!("{}; committed documents are kept", e));
            return Ok(outcome);
        }

        // Planning
        let plan = self
            .plan(&repository, &scope, &reports, &existing, &mut outcome)
            .await;
        let work = merge_work(plan, &documents, &staleness, &scope);
        if work.is_empty() {
            info!("Planner produced no work");
            return Ok(outcome);
        }

        // Ordering
        let mut titles: Vec<(DocumentId, String)> = documents
            .iter()
            .map(|d| (d.id.clone(), d.meta.title.clone()))
            .collect();
        for item in &work {
            if !titles.iter().any(|(id, _)| id == &item.id) {
                titles.push((item.id.clone(), item.title.clone()));
            }
        }
        let index = ReferenceIndex::new(titles.iter().map(|(id, t)| (id, t.as_str())));
        let references: BTreeMap<DocumentId, BTreeSet<DocumentId>> = work
            .iter()
            .map(|item| (item.id.clone(), index.resolve_all(&item.id, &item.references)))
            .collect();
        let declared: Vec<DocumentId> = work.iter().map(|w| w.id.clone()).collect();
        let (order, cycle_warning) = order_work(&declared, &references);
        if let Some(message) = cycle_warning {
            outcome.warnings.push(message);
        }

        // Writing
        self.write_all(
            work,
            &order,
            &references,
            WriteContext {
                repository,
                reports,
                link_targets: titles,
                index,
                head,
            },
            &mut outcome,
        )
        .await?;
        outcome.unchanged.sort();

        info!(
            written = outcome.written.len(),
            conflicts = outcome.skipped_conflicts.len(),
            unchanged = outcome.unchanged.len(),
            warnings = outcome.warnings.len(),
            "Regeneration run complete"
        );
        Ok(outcome)
    }

    async fn repository_context(
        &self,
        head: &str,
        outcome: &mut RegenerateOutcome,
    ) -> RepositoryContext {
        let files = match self.source.list_files().await {
            Ok(files) => files,
            Err(e) => {
                outcome.warn(format!("file manifest unavailable: {}", e));
                Vec::new()
            }
        };
        RepositoryContext {
            name: self.source.name().to_string(),
            reference: self.source.reference().to_string(),
            head_revision: head.to_string(),
            files,
        }
    }

    /// Union of changes behind the stale set, for the diff-focused scout.
    async fn changed_files(
        &self,
        detector: &ChangeDetector,
        documents: &[Document],
        staleness: &StalenessReport,
        outcome: &mut RegenerateOutcome,
    ) -> Option<Vec<String>> {
        let revisions = staleness.stale_revisions(documents);
        if revisions.is_empty() {
            return None;
        }
        match detector.changes_since_any(revisions).await {
            Ok(ChangeSet::Files(files)) if !files.is_empty() => Some(files.into_iter().collect()),
            Ok(_) => None,
            Err(e) => {
                outcome.warn(format!("change summary unavailable: {}", e));
                None
            }
        }
    }

    /// Run scouts concurrently; a failed scout becomes a warning.
    async fn explore(
        &self,
        repository: &Arc<RepositoryContext>,
        existing: &Arc<Vec<ExistingDocument>>,
        focus_areas: Vec<String>,
        changed: Option<Vec<String>>,
        outcome: &mut RegenerateOutcome,
    ) -> Vec<ScoutReport> {
        let timeout = self.options.agent_timeout;
        let scout = self.agents.scout.clone();
        let cancel = self.cancel.clone();

        let requests: Vec<ScoutRequest> = focus_areas
            .into_iter()
            .map(|focus| ScoutRequest {
                repository: repository.clone(),
                focus,
                changed_files: changed.clone(),
                existing: existing.clone(),
            })
            .collect();
        info!(scouts = requests.len(), "Exploring repository");

        let mut stream = futures::stream::iter(requests.into_iter().enumerate())
            .map(|(position, request)| {
                let scout = scout.clone();
                let cancel = cancel.clone();
                async move {
                    let label = format!("scout {}", request.focus);
                    let result = cancel
                        .race(&label, with_timeout(timeout, scout.explore(&request), &label))
                        .await;
                    (position, request.focus, result)
                }
            })
            .buffer_unordered(self.options.scout_concurrency.max(1));

        let mut reports = Vec::new();
        while let Some((position, focus, result)) = stream.next().await {
            match result {
                Ok(report) => {
                    debug!(focus = %focus, deps = report.source_dependencies.len(), "Scout finished");
                    reports.push((position, report));
                }
                Err(e) => outcome.warn(format!("scout '{}' failed: {}", focus, e)),
            }
        }

        reports.sort_by_key(|(position, _)| *position);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    async fn plan(
        &self,
        repository: &Arc<RepositoryContext>,
        scope: &Scope,
        reports: &Arc<Vec<ScoutReport>>,
        existing: &Arc<Vec<ExistingDocument>>,
        outcome: &mut RegenerateOutcome,
    ) -> Vec<PlanEntry> {
        let request = PlanRequest {
            repository: repository.clone(),
            collection_prefix: scope.prefix().to_string(),
            reports: reports.clone(),
            existing: existing.clone(),
        };
        let result = self
            .cancel
            .race(
                "planner",
                with_timeout(self.options.agent_timeout, self.agents.planner.plan(&request), "planner"),
            )
            .await;

        match result {
            Ok(plan) => {
                info!(entries = plan.len(), "Planner produced blueprint");
                plan
            }
            Err(e) if existing.is_empty() => {
                outcome.warn(format!("planner failed, planning the default page set: {}", e));
                fallback_plan(scope, &repository.files)
            }
            Err(e) => {
                outcome.warn(format!(
                    "planner failed, rewriting stale documents from stored outlines: {}",
                    e
                ));
                Vec::new()
            }
        }
    }

    /// Spawn one writer task per item and collect the results.
    async fn write_all(
        &self,
        work: Vec<WorkItem>,
        order: &[DocumentId],
        references: &BTreeMap<DocumentId, BTreeSet<DocumentId>>,
        context: WriteContext,
        outcome: &mut RegenerateOutcome,
    ) -> Result<()> {
        let shared = Arc::new(WriterShared {
            writer: self.agents.writer.clone(),
            committer: Committer::new(
                self.store.clone(),
                self.options.output_dir.clone(),
                self.run_id.clone(),
                self.source.name(),
                self.options.lock_retry_delay,
            ),
            repo_ref: self.source.reference().to_string(),
            semaphore: Semaphore::new(self.options.writer_concurrency.max(1)),
            cancel: self.cancel.clone(),
            agent_timeout: self.options.agent_timeout,
            context,
        });

        let position: HashMap<&DocumentId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut signals: HashMap<DocumentId, watch::Receiver<bool>> = HashMap::new();
        let mut items: HashMap<DocumentId, WorkItem> =
            work.into_iter().map(|w| (w.id.clone(), w)).collect();

        let mut tasks = JoinSet::new();
        for (slot, id) in order.iter().enumerate() {
            let Some(item) = items.remove(id) else {
                continue;
            };
            // Wait only on referents placed earlier; this also breaks cycles
            let waits: Vec<watch::Receiver<bool>> = references
                .get(id)
                .into_iter()
                .flatten()
                .filter(|referent| position.get(referent).is_some_and(|&p| p < slot))
                .filter_map(|referent| signals.get(referent).cloned())
                .collect();

            let (done, finished) = watch::channel(false);
            signals.insert(id.clone(), finished);
            tasks.spawn(run_writer(
                shared.clone(),
                WriterJob {
                    item,
                    slot,
                    waits,
                    done,
                },
            ));
        }

        let mut results = Vec::new();
        let mut fatal = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    if let Err(e) = &result.outcome
                        && !e.is_per_document()
                    {
                        self.cancel.cancel();
                    }
                    results.push(result);
                }
                Err(e) => outcome.warn(format!("writer task failed: {}", e)),
            }
        }
        results.sort_by_key(|r| r.slot);

        for result in results {
            outcome.warnings.extend(result.warnings);
            match result.outcome {
                Ok(CommitOutcome::Written { document, .. }) => outcome.written.push(document.id),
                Ok(CommitOutcome::Unchanged) => outcome.unchanged.push(result.id),
                Ok(CommitOutcome::Conflicted(report)) => {
                    outcome.skipped_conflicts.push(result.id);
                    outcome.conflicts.push(report);
                }
                Err(e @ DocError::CommitRaceLost { .. }) => {
                    outcome.warn(format!("{}: skipped after retry: {}", result.id, e))
                }
                Err(e) if e.is_per_document() => outcome.warn(format!("{}: {}", result.id, e)),
                Err(e) => {
                    warn!(document = %result.id, "Aborting run: {}", e);
                    fatal.get_or_insert(e);
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn existing_documents(documents: &[&Document]) -> Vec<ExistingDocument> {
    documents
        .iter()
        .map(|d| ExistingDocument {
            id: d.id.clone(),
            title: d.meta.title.clone(),
            doc_type: d.meta.doc_type.clone(),
            snippet: truncate_chars(
                strip_trailer(&d.content),
                pipeline::EXISTING_DOC_SNIPPET_CHARS,
            ),
        })
        .collect()
}

/// Focus areas for a regeneration run: the dependency areas of each stale
/// document, plus one diff-focused scout when a change summary exists.
fn regeneration_focus(
    documents: &[Document],
    staleness: &StalenessReport,
    has_diff: bool,
) -> Vec<String> {
    let by_id: HashMap<&DocumentId, &Document> = documents.iter().map(|d| (&d.id, d)).collect();
    let mut seen = HashSet::new();
    let mut areas = Vec::new();

    for stale in &staleness.stale {
        let Some(doc) = by_id.get(&stale.id) else {
            continue;
        };
        let deps = if doc.meta.dependencies.is_empty() {
            "entire repository".to_string()
        } else {
            doc.meta
                .dependencies
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let focus = format!("{} ({}): {}", doc.meta.title, doc.meta.doc_type, deps);
        if seen.insert(focus.clone()) {
            areas.push(focus);
        }
    }

    if has_diff {
        areas.push(DIFF_FOCUS.to_string());
    }
    areas
}

// =============================================================================
// Writer Tasks
// =============================================================================

struct WriteContext {
    repository: Arc<RepositoryContext>,
    reports: Arc<Vec<ScoutReport>>,
    link_targets: Vec<(DocumentId, String)>,
    index: ReferenceIndex,
    head: String,
}

struct WriterShared {
    writer: Arc<dyn Writer>,
    committer: Committer,
    repo_ref: String,
    semaphore: Semaphore,
    cancel: CancelSignal,
    agent_timeout: Duration,
    context: WriteContext,
}

struct WriterJob {
    item: WorkItem,
    slot: usize,
    waits: Vec<watch::Receiver<bool>>,
    /// Completion signal; dropping it also releases waiters
    done: watch::Sender<bool>,
}

struct WriterResult {
    slot: usize,
    id: DocumentId,
    outcome: Result<CommitOutcome>,
    warnings: Vec<String>,
}

async fn run_writer(shared: Arc<WriterShared>, job: WriterJob) -> WriterResult {
    let WriterJob {
        item,
        slot,
        waits,
        done,
    } = job;
    let mut warnings = Vec::new();
    let outcome = write_one(&shared, &item, waits, &mut warnings).await;
    done.send_replace(true);

    WriterResult {
        slot,
        id: item.id,
        outcome,
        warnings,
    }
}

async fn write_one(
    shared: &WriterShared,
    item: &WorkItem,
    waits: Vec<watch::Receiver<bool>>,
    warnings: &mut Vec<String>,
) -> Result<CommitOutcome> {
    let label = format!("writer {}", item.id);

    for mut referent in waits {
        shared
            .cancel
            .race(&label, async {
                // Err means the referent's task ended without signalling
                let _ = referent.wait_for(|finished| *finished).await;
                Ok(())
            })
            .await?;
    }

    let _permit = shared
        .semaphore
        .acquire()
        .await
        .map_err(|_| DocError::Cancelled(label.clone()))?;
    shared.cancel.check(&label)?;

    let context = &shared.context;
    let reports = relevant_reports(&context.reports, &item.doc_type);
    let scout_dependencies: BTreeSet<String> = reports
        .iter()
        .flat_map(|report| report.source_dependencies.iter().cloned())
        .collect();
    let request = WriteRequest {
        repository: context.repository.clone(),
        document_id: item.id.clone(),
        title: item.title.clone(),
        doc_type: item.doc_type.clone(),
        outline: item.outline.clone(),
        reports: Arc::new(reports),
        link_targets: context
            .link_targets
            .iter()
            .filter(|(id, _)| id != &item.id)
            .cloned()
            .collect(),
        previous_body: item
            .previous
            .as_ref()
            .map(|doc| strip_trailer(&doc.content).to_string()),
    };

    debug!(document = %item.id, reason = ?item.reason, "Writing document");
    let output = shared
        .cancel
        .race(
            &label,
            with_timeout(shared.agent_timeout, shared.writer.write(&request), &label),
        )
        .await?;

    let dependencies = declared_dependencies(item, &output, &scout_dependencies, warnings);
    let mut targets = item.references.clone();
    targets.extend(extract_wikilinks(&output.body));
    let references = context
        .index
        .resolve_all(&item.id, &targets)
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    let proposal = Proposal {
        id: item.id.clone(),
        body: output.body,
        revision: context.head.clone(),
        reason: item.reason.version_reason(),
        meta: DocumentMeta {
            title: item.title.clone(),
            doc_type: item.doc_type.clone(),
            collection: item.collection.clone(),
            repo_ref: shared.repo_ref.clone(),
            file_path: String::new(),
            dependencies,
            references,
            outline: item.outline.clone(),
        },
    };

    shared.committer.commit(&proposal).await
}

/// Scout reports a writer of `doc_type` is briefed with.
///
/// Keeps reports keyed to the type's relevant focus areas, the structure
/// baseline, reports aimed at documents of the same type and the change
/// summary. Falls back to every report when nothing matches.
fn relevant_reports(reports: &[ScoutReport], doc_type: &str) -> Vec<ScoutReport> {
    let Some((_, keys)) = pipeline::SCOUT_RELEVANCE
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(doc_type))
    else {
        return reports.to_vec();
    };
    let targeted = format!("({})", doc_type.to_lowercase());

    let relevant: Vec<ScoutReport> = reports
        .iter()
        .filter(|report| {
            let key = focus_key(&report.focus);
            key == pipeline::BASELINE_FOCUS
                || keys.contains(&key.as_str())
                || key.ends_with(&targeted)
                || report.focus == DIFF_FOCUS
        })
        .cloned()
        .collect();

    if relevant.is_empty() {
        reports.to_vec()
    } else {
        relevant
    }
}

fn focus_key(focus: &str) -> String {
    focus
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Default page set for a first run without a usable plan.
///
/// Every page links to the overview and depends on the root README when
/// the repository has one.
fn fallback_plan(scope: &Scope, files: &[String]) -> Vec<PlanEntry> {
    let readme: Vec<String> = files
        .iter()
        .find(|path| !path.contains('/') && path.to_uppercase().starts_with("README"))
        .cloned()
        .into_iter()
        .collect();
    let (overview, _, _) = pipeline::FALLBACK_PAGES[0];

    pipeline::FALLBACK_PAGES
        .iter()
        .filter_map(|&(title, doc_type, outline)| {
            let document_id = match DocumentId::from_parts(scope.prefix(), title) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping fallback page '{}': {}", title, e);
                    return None;
                }
            };
            let references = if title == overview {
                Vec::new()
            } else {
                vec![overview.to_string()]
            };
            Some(PlanEntry {
                document_id,
                title: title.to_string(),
                doc_type: doc_type.to_string(),
                collection: scope.prefix().to_string(),
                outline: outline.to_string(),
                references,
                key_files: readme.clone(),
            })
        })
        .collect()
}

/// Dependencies for a written document, most specific source first.
///
/// Writer declarations, else the planner's key files, else what the
/// relevant scouts reported, else the edges already recorded. Paths
/// escaping the repository are dropped with a warning.
fn declared_dependencies(
    item: &WorkItem,
    output: &WriterOutput,
    scout_dependencies: &BTreeSet<String>,
    warnings: &mut Vec<String>,
) -> BTreeSet<String> {
    let raw: Vec<&str> = if !output.source_dependencies.is_empty() {
        output.source_dependencies.iter().map(String::as_str).collect()
    } else if !item.key_files.is_empty() {
        item.key_files.iter().map(String::as_str).collect()
    } else if !scout_dependencies.is_empty() {
        scout_dependencies.iter().map(String::as_str).collect()
    } else {
        item.previous
            .iter()
            .flat_map(|doc| doc.meta.dependencies.iter().map(String::as_str))
            .collect()
    };

    let partitioned = DependencyGraph::partition_paths(raw);
    for rejected in partitioned.rejected {
        let message = format!("{}: {}", item.id, rejected);
        warn!("{}", message);
        warnings.push(message);
    }
    partitioned.accepted
}

