//! Startup consistency check between the registry and the version store.
//!
//! Standing invariant: every registry row equals the latest live version
//! record of its document, and every document with a live record has a row.
//! When that fails the registry is rebuilt from history; history itself is
//! never modified. An unreadable history is fatal (`StoreCorruption`).

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use super::database::SharedDatabase;
use super::registry::DocumentRegistry;
use super::versions::VersionStore;
use crate::types::{DocError, Document, DocumentId, Result, VersionRecord};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    /// Documents with a live record in history
    pub live_documents: usize,
    /// Human-readable descriptions of every mismatch found
    pub mismatches: Vec<String>,
    /// Whether the registry was rebuilt
    pub rebuilt: bool,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Verify the invariant and rebuild the registry if it does not hold.
pub fn check_and_repair(db: &SharedDatabase) -> Result<ConsistencyReport> {
    let mut report = {
        let conn = db.connection()?;
        verify_in(&conn)?
    };

    if report.is_consistent() {
        return Ok(report);
    }

    let corruption = DocError::RegistryCorruption(report.mismatches.join("; "));
    warn!("{}; rebuilding registry from history", corruption);

    report.live_documents = db.transaction(rebuild_in)?;
    report.rebuilt = true;
    info!(
        documents = report.live_documents,
        "Registry rebuilt from version store"
    );
    Ok(report)
}

/// Compare registry rows against live history without modifying anything.
///
/// An unreadable registry is reported as a mismatch; unreadable history
/// propagates as `StoreCorruption`.
pub fn verify_in(conn: &Connection) -> Result<ConsistencyReport> {
    let live = live_records_in(conn)?;
    let mut report = ConsistencyReport {
        live_documents: live.len(),
        ..Default::default()
    };

    let rows = match DocumentRegistry::list_in(conn) {
        Ok(rows) => rows,
        Err(DocError::RegistryCorruption(msg)) => {
            report.mismatches.push(msg);
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    let mut by_id: BTreeMap<DocumentId, Document> =
        rows.into_iter().map(|doc| (doc.id.clone(), doc)).collect();

    for (id, record) in &live {
        match by_id.remove(id) {
            None => report
                .mismatches
                .push(format!("'{}' has history but no registry row", id)),
            Some(doc) => {
                if !doc.hash_is_current() {
                    report
                        .mismatches
                        .push(format!("'{}' registry hash does not match its content", id));
                } else if doc.content_hash != record.content_hash {
                    report.mismatches.push(format!(
                        "'{}' registry content differs from version #{}",
                        id, record.seq
                    ));
                } else if doc.revision != record.revision {
                    report.mismatches.push(format!(
                        "'{}' registry revision {} differs from version #{} revision {}",
                        id, doc.revision, record.seq, record.revision
                    ));
                }
            }
        }
    }

    for id in by_id.keys() {
        report
            .mismatches
            .push(format!("'{}' is in the registry but has no live history", id));
    }

    Ok(report)
}

/// Replace every registry row with one derived from history.
/// Returns the number of documents restored.
pub fn rebuild_in(conn: &Connection) -> Result<usize> {
    let live = live_records_in(conn)?;
    DocumentRegistry::clear_in(conn)?;

    for (id, record) in &live {
        let history = VersionStore::history_in(conn, id)?;
        let created_at = history
            .first()
            .map(|first| first.created_at)
            .unwrap_or(record.created_at);
        let pending_conflict = VersionStore::pending_superseded_in(conn, id)?.is_some();

        let doc = Document {
            id: id.clone(),
            meta: record.meta.clone(),
            content: record.content.clone(),
            content_hash: record.content_hash.clone(),
            revision: record.revision.clone(),
            generated_at: record.created_at,
            created_at,
            human_edited: pending_conflict,
        };
        DocumentRegistry::upsert_in(conn, &doc)?;
    }

    Ok(live.len())
}

fn live_records_in(conn: &Connection) -> Result<BTreeMap<DocumentId, VersionRecord>> {
    let mut live = BTreeMap::new();
    for id in VersionStore::document_ids_in(conn)? {
        if let Some(record) = VersionStore::latest_live_in(conn, &id)? {
            live.insert(id, record);
        }
    }
    Ok(live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::types::{DocumentMeta, NewVersion, VersionReason};
    use std::sync::Arc;

    fn db() -> SharedDatabase {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        Arc::new(db)
    }

    fn commit(db: &SharedDatabase, id: &str, content: &str, reason: VersionReason) {
        let version = NewVersion {
            document_id: DocumentId::parse(id).unwrap(),
            content: content.to_string(),
            revision: "r1".to_string(),
            reason,
            run_id: None,
            meta: DocumentMeta {
                title: id.to_string(),
                file_path: format!("{}.md", id),
                ..Default::default()
            },
        };
        db.transaction(|conn| {
            let record = VersionStore::append_in(conn, &version)?;
            if reason.is_live() {
                DocumentRegistry::upsert_in(
                    conn,
                    &Document {
                        id: record.document_id.clone(),
                        meta: record.meta.clone(),
                        content: record.content.clone(),
                        content_hash: record.content_hash.clone(),
                        revision: record.revision.clone(),
                        generated_at: record.created_at,
                        created_at: record.created_at,
                        human_edited: false,
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_consistent_store_passes() {
        let db = db();
        commit(&db, "overview", "one", VersionReason::InitialGeneration);
        commit(&db, "overview", "two", VersionReason::SourceChanged);
        commit(&db, "overview", "proposal", VersionReason::SupersededByEditConflict);

        let report = check_and_repair(&db).unwrap();
        assert!(report.is_consistent());
        assert!(!report.rebuilt);
        assert_eq!(report.live_documents, 1);
    }

    #[test]
    fn test_tampered_registry_is_rebuilt() {
        let db = db();
        commit(&db, "overview", "one", VersionReason::InitialGeneration);
        commit(&db, "architecture", "arch", VersionReason::InitialGeneration);

        db.execute(
            "UPDATE documents SET content = 'tampered' WHERE id = 'overview'",
            &[],
        )
        .unwrap();
        db.execute("DELETE FROM documents WHERE id = 'architecture'", &[])
            .unwrap();

        let report = check_and_repair(&db).unwrap();
        assert!(report.rebuilt);
        assert_eq!(report.mismatches.len(), 2);

        let registry = DocumentRegistry::new(db.clone());
        let overview = registry
            .get(&DocumentId::parse("overview").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(overview.content, "one");
        assert!(
            registry
                .get(&DocumentId::parse("architecture").unwrap())
                .unwrap()
                .is_some()
        );

        assert!(check_and_repair(&db).unwrap().is_consistent());
    }

    #[test]
    fn test_orphan_registry_row_removed() {
        let db = db();
        commit(&db, "overview", "one", VersionReason::InitialGeneration);
        // Tombstone appended without dropping the registry row
        commit(&db, "overview", "", VersionReason::Removed);

        let report = check_and_repair(&db).unwrap();
        assert!(report.rebuilt);
        assert_eq!(DocumentRegistry::new(db).count().unwrap(), 0);
    }

    #[test]
    fn test_rebuild_flags_pending_conflict() {
        let db = db();
        commit(&db, "overview", "one", VersionReason::InitialGeneration);
        commit(&db, "overview", "proposal", VersionReason::SupersededByEditConflict);
        db.execute("DELETE FROM documents", &[]).unwrap();

        check_and_repair(&db).unwrap();
        let doc = DocumentRegistry::new(db)
            .get(&DocumentId::parse("overview").unwrap())
            .unwrap()
            .unwrap();
        assert!(doc.human_edited);
        assert_eq!(doc.content, "one");
    }
}
