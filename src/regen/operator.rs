//! Operator-facing actions on existing documents.
//!
//! Reconciliation is how a human settles a conflict the orchestrator
//! reported: `accept` puts the superseded machine proposal live, `keep`
//! adopts the human-edited file as the new machine baseline. Removal is the
//! only way a document leaves the registry; history keeps a tombstone.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use super::commit::place_file;
use super::conflict::{ConflictResolver, Verdict};
use crate::storage::{DocumentRegistry, StateStore, VersionStore};
use crate::types::{
    DocError, Document, DocumentId, NewVersion, Result, RunId, VersionReason, VersionRecord,
};

const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Adopt the latest superseded proposal
    Accept,
    /// Adopt the on-disk human edit
    Keep,
}

/// One row of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatus {
    pub id: DocumentId,
    pub title: String,
    pub doc_type: String,
    pub revision: String,
    pub hash: String,
    pub human_edited: bool,
    /// Sequence number of an unreconciled superseded proposal
    pub pending_conflict: Option<i64>,
    pub disk: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct Removal {
    pub record: VersionRecord,
    pub file_deleted: bool,
}

pub struct Operator {
    store: StateStore,
    output_dir: PathBuf,
    run_id: RunId,
}

impl Operator {
    pub fn new(store: StateStore, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            run_id: RunId::generate(),
        }
    }

    fn path(&self, id: &DocumentId) -> PathBuf {
        self.output_dir.join(id.file_name())
    }

    fn registered(&self, id: &DocumentId) -> Result<Document> {
        self.store
            .registry
            .get(id)?
            .ok_or_else(|| DocError::DocumentNotFound(id.to_string()))
    }

    pub fn status(&self) -> Result<Vec<DocumentStatus>> {
        self.store
            .registry
            .list()?
            .into_iter()
            .map(|doc| -> Result<DocumentStatus> {
                let pending = self.store.versions.pending_superseded(&doc.id)?;
                let disk = ConflictResolver::inspect(Some(&doc), &self.path(&doc.id))?;
                Ok(DocumentStatus {
                    hash: doc.content_hash.chars().take(HASH_PREFIX_LEN).collect(),
                    pending_conflict: pending.map(|r| r.seq),
                    title: doc.meta.title,
                    doc_type: doc.meta.doc_type,
                    revision: doc.revision,
                    human_edited: doc.human_edited,
                    id: doc.id,
                    disk,
                })
            })
            .collect()
    }

    /// Every record for `id`, oldest first.
    pub fn history(&self, id: &DocumentId) -> Result<Vec<VersionRecord>> {
        let history = self.store.versions.history(id)?;
        if history.is_empty() {
            return Err(DocError::DocumentNotFound(id.to_string()));
        }
        Ok(history)
    }

    /// A stored version; the latest record when `seq` is `None`.
    pub fn show(&self, id: &DocumentId, seq: Option<i64>) -> Result<VersionRecord> {
        let record = match seq {
            Some(seq) => self.store.versions.get(id, seq)?,
            None => self.store.versions.latest(id)?,
        };
        record.ok_or_else(|| match seq {
            Some(seq) => DocError::DocumentNotFound(format!("{} #{}", id, seq)),
            None => DocError::DocumentNotFound(id.to_string()),
        })
    }

    pub fn reconcile(&self, id: &DocumentId, resolution: Resolution) -> Result<VersionRecord> {
        let guard = self.store.locks.acquire(id, &self.run_id)?;
        let result = match resolution {
            Resolution::Accept => self.accept(id),
            Resolution::Keep => self.keep(id),
        };
        if let Err(e) = guard.release() {
            warn!(document = %id, "Failed to release commit lock: {}", e);
        }
        result
    }

    fn accept(&self, id: &DocumentId) -> Result<VersionRecord> {
        let registered = self.registered(id)?;
        let proposal = self
            .store
            .versions
            .pending_superseded(id)?
            .ok_or_else(|| DocError::NothingToReconcile(id.to_string()))?;

        let record = self.store.db.transaction(|conn| {
            let record = VersionStore::append_in(
                conn,
                &NewVersion {
                    document_id: id.clone(),
                    content: proposal.content.clone(),
                    revision: proposal.revision.clone(),
                    reason: VersionReason::ConflictAccepted,
                    run_id: Some(self.run_id.to_string()),
                    meta: proposal.meta.clone(),
                },
            )?;
            DocumentRegistry::upsert_in(conn, &adopted(&registered, &record))?;
            Ok(record)
        })?;

        place_file(&self.path(id), &record.content, &self.run_id)?;
        info!(document = %id, seq = record.seq, "Accepted superseded proposal");
        Ok(record)
    }

    fn keep(&self, id: &DocumentId) -> Result<VersionRecord> {
        let registered = self.registered(id)?;
        let path = self.path(id);
        let live = ConflictResolver::read_live(&path)?
            .ok_or_else(|| DocError::DocumentNotFound(path.display().to_string()))?;
        let pending = self.store.versions.pending_superseded(id)?;

        if pending.is_none() && ConflictResolver::verdict(Some(&registered), Some(&live)) == Verdict::Clean {
            return Err(DocError::NothingToReconcile(id.to_string()));
        }
        let content = String::from_utf8(live)
            .map_err(|e| DocError::Storage(format!("{} is not UTF-8: {}", path.display(), e)))?;

        // Baseline at the proposal's revision so the next run does not
        // immediately regenerate over the adopted edit
        let (revision, meta) = match &pending {
            Some(record) => (record.revision.clone(), record.meta.clone()),
            None => (registered.revision.clone(), registered.meta.clone()),
        };

        let record = self.store.db.transaction(|conn| {
            let record = VersionStore::append_in(
                conn,
                &NewVersion {
                    document_id: id.clone(),
                    content: content.clone(),
                    revision: revision.clone(),
                    reason: VersionReason::HumanEditAdopted,
                    run_id: Some(self.run_id.to_string()),
                    meta: meta.clone(),
                },
            )?;
            DocumentRegistry::upsert_in(conn, &adopted(&registered, &record))?;
            Ok(record)
        })?;

        info!(document = %id, seq = record.seq, "Adopted human edit as baseline");
        Ok(record)
    }

    /// Tombstone the document, drop it from the registry and delete its file.
    ///
    /// Refuses when the file carries a human edit unless `force` is set.
    pub fn remove(&self, id: &DocumentId, force: bool) -> Result<Removal> {
        let guard = self.store.locks.acquire(id, &self.run_id)?;
        let result = self.remove_locked(id, force);
        if let Err(e) = guard.release() {
            warn!(document = %id, "Failed to release commit lock: {}", e);
        }
        result
    }

    fn remove_locked(&self, id: &DocumentId, force: bool) -> Result<Removal> {
        let registered = self.registered(id)?;
        let path = self.path(id);
        if !force
            && let Verdict::Edited { .. } = ConflictResolver::inspect(Some(&registered), &path)?
        {
            return Err(DocError::ConflictDetected {
                document_id: id.to_string(),
            });
        }

        let record = self.store.db.transaction(|conn| {
            let record = VersionStore::append_in(
                conn,
                &NewVersion {
                    document_id: id.clone(),
                    content: String::new(),
                    revision: registered.revision.clone(),
                    reason: VersionReason::Removed,
                    run_id: Some(self.run_id.to_string()),
                    meta: registered.meta.clone(),
                },
            )?;
            DocumentRegistry::remove_in(conn, id)?;
            Ok(record)
        })?;

        let file_deleted = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        info!(document = %id, seq = record.seq, file_deleted, "Removed document");
        Ok(Removal {
            record,
            file_deleted,
        })
    }
}

/// Registry row for a record that became the live version.
fn adopted(registered: &Document, record: &VersionRecord) -> Document {
    Document {
        id: record.document_id.clone(),
        meta: record.meta.clone(),
        content: record.content.clone(),
        content_hash: record.content_hash.clone(),
        revision: record.revision.clone(),
        generated_at: record.created_at,
        created_at: registered.created_at,
        human_edited: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regen::commit::{CommitOutcome, Committer, Proposal};
    use crate::types::{DocumentMeta, content_hash};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        store: StateStore,
        dir: TempDir,
        id: DocumentId,
    }

    impl Fixture {
        fn operator(&self) -> Operator {
            Operator::new(self.store.clone(), self.dir.path())
        }

        fn path(&self) -> PathBuf {
            self.dir.path().join("overview.md")
        }
    }

    async fn commit(store: &StateStore, dir: &TempDir, body: &str, revision: &str) -> CommitOutcome {
        Committer::new(
            store.clone(),
            dir.path(),
            RunId::generate(),
            "acme/widgets",
            Duration::from_millis(10),
        )
        .commit(&Proposal {
            id: DocumentId::parse("overview").unwrap(),
            body: body.to_string(),
            revision: revision.to_string(),
            reason: VersionReason::SourceChanged,
            meta: DocumentMeta {
                title: "Overview".to_string(),
                doc_type: "overview".to_string(),
                ..Default::default()
            },
        })
        .await
        .unwrap()
    }

    /// A generated document, hand-edited, then a conflicting regeneration.
    async fn conflicted() -> Fixture {
        let fixture = Fixture {
            store: StateStore::open_in_memory().unwrap(),
            dir: TempDir::new().unwrap(),
            id: DocumentId::parse("overview").unwrap(),
        };
        commit(&fixture.store, &fixture.dir, "v1\n", "r1").await;
        std::fs::write(fixture.path(), "hand edited\n").unwrap();
        let outcome = commit(&fixture.store, &fixture.dir, "v2\n", "r2").await;
        assert!(matches!(outcome, CommitOutcome::Conflicted(_)));
        fixture
    }

    #[tokio::test]
    async fn test_status_reports_conflict() {
        let f = conflicted().await;
        let status = f.operator().status().unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].human_edited);
        assert_eq!(status[0].pending_conflict, Some(2));
        assert!(matches!(status[0].disk, Verdict::Edited { .. }));
        assert_eq!(status[0].hash.len(), HASH_PREFIX_LEN);
    }

    #[tokio::test]
    async fn test_accept_puts_proposal_live() {
        let f = conflicted().await;
        let record = f.operator().reconcile(&f.id, Resolution::Accept).unwrap();

        assert_eq!(record.reason, VersionReason::ConflictAccepted);
        assert_eq!(record.revision, "r2");
        let on_disk = std::fs::read_to_string(f.path()).unwrap();
        assert_eq!(on_disk, record.content);

        let registered = f.store.registry.get(&f.id).unwrap().unwrap();
        assert!(!registered.human_edited);
        assert_eq!(registered.content_hash, content_hash(on_disk.as_bytes()));
        assert!(f.store.versions.pending_superseded(&f.id).unwrap().is_none());
        assert!(f.store.verify().unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_keep_adopts_human_edit() {
        let f = conflicted().await;
        let record = f.operator().reconcile(&f.id, Resolution::Keep).unwrap();

        assert_eq!(record.reason, VersionReason::HumanEditAdopted);
        assert_eq!(record.content, "hand edited\n");
        assert_eq!(record.revision, "r2");
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "hand edited\n");

        let registered = f.store.registry.get(&f.id).unwrap().unwrap();
        assert!(!registered.human_edited);
        assert_eq!(registered.revision, "r2");

        // Nothing left to settle
        assert!(matches!(
            f.operator().reconcile(&f.id, Resolution::Accept),
            Err(DocError::NothingToReconcile(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_tombstones_and_refuses_edits() {
        let f = conflicted().await;
        let operator = f.operator();

        assert!(matches!(
            operator.remove(&f.id, false),
            Err(DocError::ConflictDetected { .. })
        ));

        let removal = operator.remove(&f.id, true).unwrap();
        assert!(removal.file_deleted);
        assert_eq!(removal.record.reason, VersionReason::Removed);
        assert!(f.store.registry.get(&f.id).unwrap().is_none());
        assert!(!f.path().exists());

        let history = operator.history(&f.id).unwrap();
        assert_eq!(history.len(), 3);
        assert!(f.store.verify().unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_show_by_sequence() {
        let f = conflicted().await;
        let operator = f.operator();
        assert_eq!(operator.show(&f.id, Some(1)).unwrap().seq, 1);
        assert_eq!(operator.show(&f.id, None).unwrap().seq, 2);
        assert!(matches!(
            operator.show(&f.id, Some(9)),
            Err(DocError::DocumentNotFound(_))
        ));
    }
}
