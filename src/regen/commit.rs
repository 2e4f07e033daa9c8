//! Commit step: the only path that mutates the registry and history.
//!
//! Sequence per document: advisory lock, stage the rendered file next to its
//! destination, then one transaction that reads the registry row, asks the
//! conflict resolver for a verdict, appends the version record and renames
//! the staged file into place before committing. A failed rename rolls the
//! record back. No agent call happens while the lock is held.

use std::path::{Path, PathBuf};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::conflict::{ConflictReport, ConflictResolver, Verdict};
use super::trailer::{Trailer, strip_trailer};
use crate::constants::layout::GENERATOR;
use crate::storage::{CommitLockGuard, DocumentRegistry, StateStore, VersionStore};
use crate::types::{
    DocError, Document, DocumentId, DocumentMeta, NewVersion, Result, RunId, VersionReason,
    VersionRecord, format_timestamp,
};

/// Generated content ready to commit.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: DocumentId,
    /// Writer body without trailer
    pub body: String,
    /// Revision the body was generated against
    pub revision: String,
    pub reason: VersionReason,
    /// `file_path` is filled in by the committer
    pub meta: DocumentMeta,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Written {
        document: Box<Document>,
        record: VersionRecord,
    },
    /// Same body, revision and edges as the live document; nothing appended
    Unchanged,
    Conflicted(ConflictReport),
}

enum Decision {
    Write(Box<Document>, VersionRecord),
    Unchanged,
    Conflict(ConflictReport),
}

pub struct Committer {
    store: StateStore,
    output_dir: PathBuf,
    run_id: RunId,
    repo_name: String,
    lock_retry_delay: Duration,
}

impl Committer {
    pub fn new(
        store: StateStore,
        output_dir: impl Into<PathBuf>,
        run_id: RunId,
        repo_name: impl Into<String>,
        lock_retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            run_id,
            repo_name: repo_name.into(),
            lock_retry_delay,
        }
    }

    pub fn output_path(&self, id: &DocumentId) -> PathBuf {
        self.output_dir.join(id.file_name())
    }

    /// Commit one proposal under the document's advisory lock.
    pub async fn commit(&self, proposal: &Proposal) -> Result<CommitOutcome> {
        let guard = self.acquire(&proposal.id).await?;
        let outcome = self.commit_locked(proposal);
        if let Err(e) = guard.release() {
            warn!(document = %proposal.id, "Failed to release commit lock: {}", e);
        }
        outcome
    }

    /// Take the lock, retrying once after `lock_retry_delay` on contention.
    async fn acquire(&self, id: &DocumentId) -> Result<CommitLockGuard> {
        (|| async { self.store.locks.acquire(id, &self.run_id) })
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.lock_retry_delay)
                    .with_max_times(1),
            )
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, DocError::CommitRaceLost { .. }))
            .notify(|e, delay| debug!(document = %id, ?delay, "Commit lock busy: {}", e))
            .await
    }

    fn commit_locked(&self, proposal: &Proposal) -> Result<CommitOutcome> {
        let path = self.output_path(&proposal.id);
        let mut meta = proposal.meta.clone();
        meta.file_path = proposal.id.file_name();

        let content = self.render(proposal, &meta)?;
        let staged = stage(&path, &content, &self.run_id)?;

        let decision = self
            .store
            .db
            .transaction(|conn| {
                let registered = DocumentRegistry::get_in(conn, &proposal.id)?;
                let verdict = ConflictResolver::inspect(registered.as_ref(), &path)?;
                debug!(document = %proposal.id, ?verdict, "Commit verdict");

                match (verdict, registered) {
                    (Verdict::Edited { live_hash }, Some(doc)) => {
                        let record = VersionStore::append_in(
                            conn,
                            &NewVersion {
                                document_id: proposal.id.clone(),
                                content: content.clone(),
                                revision: proposal.revision.clone(),
                                reason: VersionReason::SupersededByEditConflict,
                                run_id: Some(self.run_id.to_string()),
                                meta: meta.clone(),
                            },
                        )?;
                        DocumentRegistry::set_human_edited_in(conn, &proposal.id, true)?;
                        Ok(Decision::Conflict(ConflictReport {
                            document_id: proposal.id.clone(),
                            expected_hash: doc.content_hash,
                            live_hash,
                            superseded_seq: record.seq,
                        }))
                    }
                    (Verdict::Clean, Some(doc)) if is_same_output(&doc, proposal, &meta) => {
                        Ok(Decision::Unchanged)
                    }
                    (_, registered) => {
                        let created_at = registered.map(|doc| doc.created_at);
                        let record = VersionStore::append_in(
                            conn,
                            &NewVersion {
                                document_id: proposal.id.clone(),
                                content: content.clone(),
                                revision: proposal.revision.clone(),
                                reason: proposal.reason,
                                run_id: Some(self.run_id.to_string()),
                                meta: meta.clone(),
                            },
                        )?;
                        let document = Document {
                            id: proposal.id.clone(),
                            meta: meta.clone(),
                            content: record.content.clone(),
                            content_hash: record.content_hash.clone(),
                            revision: record.revision.clone(),
                            generated_at: record.created_at,
                            created_at: created_at.unwrap_or(record.created_at),
                            human_edited: false,
                        };
                        DocumentRegistry::upsert_in(conn, &document)?;
                        std::fs::rename(&staged, &path)?;
                        Ok(Decision::Write(Box::new(document), record))
                    }
                }
            })
            .inspect_err(|e| {
                if staged.exists() {
                    discard(&staged);
                } else {
                    // Renamed but not committed; the next run sees an edited file
                    error!(document = %proposal.id, "File placed but commit failed: {}", e);
                }
            })?;

        match decision {
            Decision::Write(document, record) => {
                info!(
                    document = %document.id,
                    seq = record.seq,
                    reason = %record.reason,
                    revision = %record.revision,
                    "Committed document"
                );
                Ok(CommitOutcome::Written { document, record })
            }
            Decision::Unchanged => {
                discard(&staged);
                debug!(document = %proposal.id, "Output identical to live document");
                Ok(CommitOutcome::Unchanged)
            }
            Decision::Conflict(report) => {
                discard(&staged);
                warn!(
                    document = %report.document_id,
                    seq = report.superseded_seq,
                    "Human edit detected; proposed content kept in history only"
                );
                Ok(CommitOutcome::Conflicted(report))
            }
        }
    }

    fn render(&self, proposal: &Proposal, meta: &DocumentMeta) -> Result<String> {
        Trailer {
            id: proposal.id.to_string(),
            repo_url: meta.repo_ref.clone(),
            repo_name: self.repo_name.clone(),
            doc_type: meta.doc_type.clone(),
            collection: meta.collection.clone(),
            revision: proposal.revision.clone(),
            generated_at: format_timestamp(&Utc::now()),
            generator: GENERATOR.to_string(),
        }
        .render(&proposal.body)
    }
}

fn is_same_output(live: &Document, proposal: &Proposal, meta: &DocumentMeta) -> bool {
    live.revision == proposal.revision
        && strip_trailer(&live.content) == proposal.body.trim_end()
        && live.meta == *meta
}

/// Atomically replace the file at `path` with `content`.
pub(super) fn place_file(path: &Path, content: &str, run_id: &RunId) -> Result<()> {
    let staged = stage(path, content, run_id)?;
    std::fs::rename(&staged, path).inspect_err(|_| discard(&staged))?;
    Ok(())
}

/// Write `content` to a run-private sibling of `path`.
fn stage(path: &Path, content: &str, run_id: &RunId) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staged = path.with_file_name(format!(".{}.{}.tmp", file_name, run_id));
    std::fs::write(&staged, content)?;
    Ok(staged)
}

fn discard(staged: &Path) {
    if let Err(e) = std::fs::remove_file(staged)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove staged file {}: {}", staged.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regen::trailer::parse_trailer;
    use crate::types::content_hash;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn id(raw: &str) -> DocumentId {
        DocumentId::parse(raw).unwrap()
    }

    fn proposal(raw: &str, body: &str, revision: &str, reason: VersionReason) -> Proposal {
        Proposal {
            id: id(raw),
            body: body.to_string(),
            revision: revision.to_string(),
            reason,
            meta: DocumentMeta {
                title: "Overview".to_string(),
                doc_type: "overview".to_string(),
                repo_ref: "https://github.com/acme/widgets".to_string(),
                dependencies: BTreeSet::from(["README".to_string()]),
                ..Default::default()
            },
        }
    }

    fn committer(store: &StateStore, dir: &TempDir, run: &str) -> Committer {
        Committer::new(
            store.clone(),
            dir.path(),
            RunId::new(run),
            "acme/widgets",
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_first_write_persists_file_and_record() {
        let store = StateStore::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let committer = committer(&store, &dir, "run-1");

        let outcome = committer
            .commit(&proposal("overview", "# Overview\n", "r1", VersionReason::InitialGeneration))
            .await
            .unwrap();
        let CommitOutcome::Written { document, record } = outcome else {
            panic!("expected a write");
        };

        let on_disk = std::fs::read_to_string(dir.path().join("overview.md")).unwrap();
        assert_eq!(on_disk, document.content);
        assert_eq!(document.content_hash, content_hash(on_disk.as_bytes()));
        assert_eq!(record.seq, 1);
        assert_eq!(record.run_id.as_deref(), Some("run-1"));
        assert_eq!(document.meta.file_path, "overview.md");

        let (body, trailer) = parse_trailer(&on_disk).unwrap();
        assert_eq!(body, "# Overview");
        assert_eq!(trailer.revision, "r1");
        assert_eq!(trailer.repo_name, "acme/widgets");

        let registered = store.registry.get(&id("overview")).unwrap().unwrap();
        assert_eq!(registered.content_hash, document.content_hash);
        assert!(store.locks.holder(&id("overview")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_human_edit_is_preserved() {
        let store = StateStore::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let committer = committer(&store, &dir, "run-1");
        committer
            .commit(&proposal("overview", "v1\n", "r1", VersionReason::InitialGeneration))
            .await
            .unwrap();

        let path = dir.path().join("overview.md");
        std::fs::write(&path, "human notes\n").unwrap();

        let outcome = committer
            .commit(&proposal("overview", "v2\n", "r2", VersionReason::SourceChanged))
            .await
            .unwrap();
        let CommitOutcome::Conflicted(report) = outcome else {
            panic!("expected a conflict");
        };
        assert_eq!(report.superseded_seq, 2);
        assert_eq!(report.live_hash, content_hash(b"human notes\n"));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "human notes\n");
        let registered = store.registry.get(&id("overview")).unwrap().unwrap();
        assert!(registered.human_edited);
        assert_eq!(registered.revision, "r1");

        let pending = store.versions.pending_superseded(&id("overview")).unwrap().unwrap();
        assert!(strip_trailer(&pending.content).starts_with("v2"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_file_is_rewritten() {
        let store = StateStore::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let committer = committer(&store, &dir, "run-1");
        committer
            .commit(&proposal("overview", "v1\n", "r1", VersionReason::InitialGeneration))
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("overview.md")).unwrap();

        let outcome = committer
            .commit(&proposal("overview", "v2\n", "r2", VersionReason::SourceChanged))
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Written { .. }));
        assert!(dir.path().join("overview.md").exists());
    }

    #[tokio::test]
    async fn test_identical_output_appends_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let committer = committer(&store, &dir, "run-1");
        let first = proposal("overview", "same\n", "r1", VersionReason::InitialGeneration);
        committer.commit(&first).await.unwrap();

        let again = proposal("overview", "same\n", "r1", VersionReason::ManualRegeneration);
        assert!(matches!(committer.commit(&again).await.unwrap(), CommitOutcome::Unchanged));
        assert_eq!(store.versions.history(&id("overview")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_placement_rolls_back_record() {
        let store = StateStore::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        // A directory where the document file should go makes the rename fail
        let blocked = dir.path().join("overview.md");
        std::fs::create_dir_all(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();

        let result = committer(&store, &dir, "run-1")
            .commit(&proposal("overview", "v1\n", "r1", VersionReason::InitialGeneration))
            .await;
        assert!(result.is_err());

        assert!(!store.versions.has_history(&id("overview")).unwrap());
        assert!(store.registry.get(&id("overview")).unwrap().is_none());
        assert!(blocked.join("keep").exists());
        assert!(store.locks.holder(&id("overview")).unwrap().is_none());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_contended_lock_is_race_lost() {
        let store = StateStore::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let _held = store.locks.acquire(&id("overview"), &RunId::new("other")).unwrap();

        let err = committer(&store, &dir, "run-1")
            .commit(&proposal("overview", "v1\n", "r1", VersionReason::InitialGeneration))
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::CommitRaceLost { .. }));
        assert!(!store.versions.has_history(&id("overview")).unwrap());
        assert!(!dir.path().join("overview.md").exists());
    }
}
