//! In-memory collaborators for tests: a fake repository with scripted
//! history and scripted scout/planner/writer agents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{
    PlanEntry, PlanRequest, Planner, Scout, ScoutReport, ScoutRequest, WriteRequest, Writer,
    WriterOutput,
};
use crate::storage::{DocumentRegistry, StateStore, VersionStore};
use crate::types::{
    DocError, Document, DocumentId, DocumentMeta, NewVersion, Result, VersionReason,
};

// =============================================================================
// Repository
// =============================================================================

#[derive(Default)]
struct History {
    revisions: Vec<(String, BTreeMap<String, String>)>,
    diff_calls: usize,
}

/// Repository whose history is a list of named snapshots.
#[derive(Default)]
pub struct MemoryRepository {
    history: Mutex<History>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a revision: the previous snapshot with `changes` applied.
    /// Empty content deletes the file.
    pub fn commit(&self, revision: &str, changes: &[(&str, &str)]) {
        let mut history = self.history.lock().unwrap();
        let mut files = history
            .revisions
            .last()
            .map(|(_, files)| files.clone())
            .unwrap_or_default();
        for (path, content) in changes {
            if content.is_empty() {
                files.remove(*path);
            } else {
                files.insert(path.to_string(), content.to_string());
            }
        }
        history.revisions.push((revision.to_string(), files));
    }

    pub fn diff_calls(&self) -> usize {
        self.history.lock().unwrap().diff_calls
    }

    fn snapshot(&self, revision: &str) -> Result<BTreeMap<String, String>> {
        self.history
            .lock()
            .unwrap()
            .revisions
            .iter()
            .find(|(rev, _)| rev == revision)
            .map(|(_, files)| files.clone())
            .ok_or_else(|| DocError::unknown_revision(revision))
    }

    fn head(&self) -> Result<(String, BTreeMap<String, String>)> {
        self.history
            .lock()
            .unwrap()
            .revisions
            .last()
            .cloned()
            .ok_or_else(|| DocError::Git("empty repository".to_string()))
    }
}

#[async_trait]
impl crate::source::RepositorySource for MemoryRepository {
    fn reference(&self) -> &str {
        "https://github.com/acme/widgets"
    }

    fn name(&self) -> &str {
        "acme/widgets"
    }

    async fn resolve_head_revision(&self) -> Result<String> {
        Ok(self.head()?.0)
    }

    async fn diff(&self, from: &str, to: &str) -> Result<BTreeSet<String>> {
        let before = self.snapshot(from)?;
        let after = self.snapshot(to)?;
        self.history.lock().unwrap().diff_calls += 1;

        let paths: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        Ok(paths
            .into_iter()
            .filter(|path| before.get(*path) != after.get(*path))
            .cloned()
            .collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let (_, files) = self.head()?;
        files
            .get(path)
            .map(|content| content.as_bytes().to_vec())
            .ok_or_else(|| DocError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.head()?.1.into_keys().collect())
    }
}

// =============================================================================
// Store Fixtures
// =============================================================================

/// Register a machine-written document with one initial version record.
pub fn seed_document(store: &StateStore, id: &str, revision: &str, deps: &[&str]) -> Document {
    let id = DocumentId::parse(id).unwrap();
    let meta = DocumentMeta {
        title: id.as_str().rsplit('/').next().unwrap_or_default().to_string(),
        doc_type: "guide".to_string(),
        file_path: id.file_name(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    };

    store
        .db
        .transaction(|conn| {
            let record = VersionStore::append_in(
                conn,
                &NewVersion {
                    document_id: id.clone(),
                    content: format!("# {}\n", id),
                    revision: revision.to_string(),
                    reason: VersionReason::InitialGeneration,
                    run_id: None,
                    meta: meta.clone(),
                },
            )?;
            let document = Document {
                id: id.clone(),
                meta: meta.clone(),
                content: record.content,
                content_hash: record.content_hash,
                revision: record.revision,
                generated_at: record.created_at,
                created_at: record.created_at,
                human_edited: false,
            };
            DocumentRegistry::upsert_in(conn, &document)?;
            Ok(document)
        })
        .unwrap()
}

// =============================================================================
// Scripted Agents
// =============================================================================

/// Scout that echoes its focus area and records every call.
#[derive(Default)]
pub struct ScriptedScout {
    calls: Mutex<Vec<(String, Option<Vec<String>>)>>,
    dependencies: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedScout {
    /// Dependencies reported by scouts whose focus starts with `focus`.
    pub fn declare(&self, focus: &str, deps: &[&str]) {
        self.dependencies
            .lock()
            .unwrap()
            .push((focus.to_string(), deps.iter().map(|d| d.to_string()).collect()));
    }

    /// (focus, changed files) of every call, in call order.
    pub fn calls(&self) -> Vec<(String, Option<Vec<String>>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scout for ScriptedScout {
    async fn explore(&self, request: &ScoutRequest) -> Result<ScoutReport> {
        self.calls
            .lock()
            .unwrap()
            .push((request.focus.clone(), request.changed_files.clone()));
        let source_dependencies = self
            .dependencies
            .lock()
            .unwrap()
            .iter()
            .filter(|(focus, _)| request.focus.starts_with(focus.as_str()))
            .flat_map(|(_, deps)| deps.iter().cloned())
            .collect();
        Ok(ScoutReport {
            focus: request.focus.clone(),
            report: format!("findings for {}", request.focus),
            source_dependencies,
        })
    }
}

/// Planner returning a fixed blueprint.
#[derive(Default)]
pub struct ScriptedPlanner {
    entries: Mutex<Vec<PlanEntry>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl ScriptedPlanner {
    pub fn set_entries(&self, entries: Vec<PlanEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Plan entry at the output root.
pub fn plan_entry(title: &str, doc_type: &str, key_files: &[&str], references: &[&str]) -> PlanEntry {
    PlanEntry {
        document_id: DocumentId::from_parts("", title).unwrap(),
        title: title.to_string(),
        doc_type: doc_type.to_string(),
        collection: String::new(),
        outline: format!("outline of {}", title),
        references: references.iter().map(|r| r.to_string()).collect(),
        key_files: key_files.iter().map(|k| k.to_string()).collect(),
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<Vec<PlanEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DocError::agent("planner", "plan", "scripted failure"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }
}

/// Writer with a deterministic body per (document, revision).
#[derive(Default)]
pub struct ScriptedWriter {
    dependencies: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<BTreeSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    briefs: Mutex<HashMap<String, Vec<String>>>,
}

impl ScriptedWriter {
    pub fn declare(&self, id: &str, deps: &[&str]) {
        self.dependencies
            .lock()
            .unwrap()
            .insert(id.to_string(), deps.iter().map(|d| d.to_string()).collect());
    }

    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn delay_for(&self, id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(id.to_string(), delay);
    }

    /// Document ids in the order writing started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Document ids in the order writing finished.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Focus areas of the scout reports handed to the writer of `id`.
    pub fn briefed(&self, id: &str) -> Vec<String> {
        self.briefs.lock().unwrap().get(id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Writer for ScriptedWriter {
    async fn write(&self, request: &WriteRequest) -> Result<WriterOutput> {
        let id = request.document_id.to_string();
        self.calls.lock().unwrap().push(id.clone());
        self.briefs.lock().unwrap().insert(
            id.clone(),
            request.reports.iter().map(|r| r.focus.clone()).collect(),
        );

        let delay = self.delays.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&id) {
            return Err(DocError::agent("writer", &id, "scripted failure"));
        }

        let deps = self
            .dependencies
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default();
        self.completed.lock().unwrap().push(id.clone());

        Ok(WriterOutput {
            body: format!(
                "# {}\n\nWritten at {}.\n",
                request.title, request.repository.head_revision
            ),
            source_dependencies: deps.into_iter().collect(),
        })
    }
}
