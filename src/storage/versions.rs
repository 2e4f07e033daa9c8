//! Version Store
//!
//! Append-only, per-document history. This is the authoritative record of
//! every document: the registry is rebuilt from it when the two disagree.
//!
//! Ordering: `seq` is strictly increasing per document and `created_at` is
//! forced strictly increasing alongside it, so sorting by either yields the
//! same sequence.

use chrono::{Duration, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::database::SharedDatabase;
use crate::types::{
    DocError, DocumentId, DocumentMeta, NewVersion, Result, VersionReason, VersionRecord,
    content_hash, format_timestamp, parse_timestamp,
};

const SELECT_COLUMNS: &str =
    "document_id, seq, content, content_hash, revision, created_at, reason, run_id, meta";

type RawVersionRow = (
    String,
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode(raw: RawVersionRow) -> Result<VersionRecord> {
    let (id, seq, content, hash, revision, created_at, reason, run_id, meta) = raw;

    let document_id = DocumentId::parse(&id)
        .map_err(|e| DocError::StoreCorruption(format!("version row id: {}", e)))?;
    if content_hash(content.as_bytes()) != hash {
        return Err(DocError::StoreCorruption(format!(
            "version {}#{} content does not match its hash",
            id, seq
        )));
    }
    let meta: DocumentMeta = serde_json::from_str(&meta).map_err(|e| {
        DocError::StoreCorruption(format!("version {}#{} metadata: {}", id, seq, e))
    })?;

    Ok(VersionRecord {
        document_id,
        seq,
        content,
        content_hash: hash,
        revision,
        created_at: parse_timestamp(&created_at)?,
        reason: reason.parse()?,
        run_id,
        meta,
    })
}

/// History access. Cheap to clone.
#[derive(Clone)]
pub struct VersionStore {
    db: SharedDatabase,
}

impl VersionStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Append one record in its own transaction.
    pub fn append(&self, version: &NewVersion) -> Result<VersionRecord> {
        self.db.transaction(|conn| Self::append_in(conn, version))
    }

    /// Append one record inside a caller-owned transaction.
    pub fn append_in(conn: &Connection, version: &NewVersion) -> Result<VersionRecord> {
        let id = version.document_id.as_str();

        let previous: Option<(i64, String)> = conn
            .query_row(
                "SELECT seq, created_at FROM versions WHERE document_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let mut created_at = Utc::now().trunc_subsecs(6);
        let seq = match previous {
            Some((last_seq, last_ts)) => {
                let last_ts = parse_timestamp(&last_ts)?;
                if created_at <= last_ts {
                    created_at = last_ts + Duration::microseconds(1);
                }
                last_seq + 1
            }
            None => 1,
        };

        let record = VersionRecord {
            document_id: version.document_id.clone(),
            seq,
            content: version.content.clone(),
            content_hash: version.content_hash(),
            revision: version.revision.clone(),
            created_at,
            reason: version.reason,
            run_id: version.run_id.clone(),
            meta: version.meta.clone(),
        };

        conn.execute(
            &format!(
                "INSERT INTO versions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                SELECT_COLUMNS
            ),
            params![
                id,
                record.seq,
                record.content,
                record.content_hash,
                record.revision,
                format_timestamp(&record.created_at),
                record.reason.as_str(),
                record.run_id,
                serde_json::to_string(&record.meta)?,
            ],
        )?;

        tracing::debug!(
            document = id,
            seq = record.seq,
            reason = %record.reason,
            "Appended version record"
        );

        Ok(record)
    }

    /// Full history for one document, oldest first.
    pub fn history(&self, id: &DocumentId) -> Result<Vec<VersionRecord>> {
        let conn = self.db.connection()?;
        Self::history_in(&conn, id)
    }

    pub fn history_in(conn: &Connection, id: &DocumentId) -> Result<Vec<VersionRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM versions WHERE document_id = ?1 ORDER BY seq",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![id.as_str()], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DocError::StoreCorruption(format!("unreadable history: {}", e)))?;
        rows.into_iter().map(decode).collect()
    }

    pub fn get(&self, id: &DocumentId, seq: i64) -> Result<Option<VersionRecord>> {
        let conn = self.db.connection()?;
        Self::query_one(
            &conn,
            "WHERE document_id = ?1 AND seq = ?2",
            params![id.as_str(), seq],
        )
    }

    /// Most recent record of any kind.
    pub fn latest(&self, id: &DocumentId) -> Result<Option<VersionRecord>> {
        let conn = self.db.connection()?;
        Self::latest_in(&conn, id)
    }

    pub fn latest_in(conn: &Connection, id: &DocumentId) -> Result<Option<VersionRecord>> {
        Self::query_one(
            conn,
            "WHERE document_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![id.as_str()],
        )
    }

    /// The record the live document should equal, or `None` when the
    /// document was never committed or has been removed.
    pub fn latest_live_in(conn: &Connection, id: &DocumentId) -> Result<Option<VersionRecord>> {
        let latest = Self::query_one(
            conn,
            "WHERE document_id = ?1 AND reason != ?2 ORDER BY seq DESC LIMIT 1",
            params![
                id.as_str(),
                VersionReason::SupersededByEditConflict.as_str()
            ],
        )?;
        Ok(latest.filter(|record| record.reason.is_live()))
    }

    pub fn latest_live(&self, id: &DocumentId) -> Result<Option<VersionRecord>> {
        let conn = self.db.connection()?;
        Self::latest_live_in(&conn, id)
    }

    /// Latest superseded proposal not yet followed by a live record.
    pub fn pending_superseded_in(
        conn: &Connection,
        id: &DocumentId,
    ) -> Result<Option<VersionRecord>> {
        match Self::latest_in(conn, id)? {
            Some(record) if record.reason == VersionReason::SupersededByEditConflict => {
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    pub fn pending_superseded(&self, id: &DocumentId) -> Result<Option<VersionRecord>> {
        let conn = self.db.connection()?;
        Self::pending_superseded_in(&conn, id)
    }

    /// Every document id that has at least one record.
    pub fn document_ids_in(conn: &Connection) -> Result<Vec<DocumentId>> {
        let mut stmt = conn.prepare("SELECT DISTINCT document_id FROM versions ORDER BY 1")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DocError::StoreCorruption(format!("unreadable history: {}", e)))?;

        ids.iter()
            .map(|raw| {
                DocumentId::parse(raw)
                    .map_err(|e| DocError::StoreCorruption(format!("version row id: {}", e)))
            })
            .collect()
    }

    pub fn has_history(&self, id: &DocumentId) -> Result<bool> {
        let conn = self.db.connection()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM versions WHERE document_id = ?1)",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Total number of records across all documents.
    pub fn count(&self) -> Result<usize> {
        let conn = self.db.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn query_one(
        conn: &Connection,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<VersionRecord>> {
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM versions {}", SELECT_COLUMNS, clause),
                params,
                read_row,
            )
            .optional()
            .map_err(|e| DocError::StoreCorruption(format!("unreadable history: {}", e)))?;
        raw.map(decode).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use std::sync::Arc;

    fn store() -> VersionStore {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        VersionStore::new(Arc::new(db))
    }

    fn version(id: &str, content: &str, reason: VersionReason) -> NewVersion {
        NewVersion {
            document_id: DocumentId::parse(id).unwrap(),
            content: content.to_string(),
            revision: "r1".to_string(),
            reason,
            run_id: Some("run-1".to_string()),
            meta: DocumentMeta::default(),
        }
    }

    #[test]
    fn test_append_assigns_increasing_seq_and_time() {
        let store = store();
        for i in 0..5 {
            store
                .append(&version("overview", &format!("v{}", i), VersionReason::SourceChanged))
                .unwrap();
        }

        let id = DocumentId::parse("overview").unwrap();
        let history = store.history(&id).unwrap();
        assert_eq!(history.len(), 5);
        for pair in history.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
            assert!(pair[0].created_at < pair[1].created_at);
        }
        assert_eq!(history[4].content, "v4");
    }

    #[test]
    fn test_latest_live_skips_superseded() {
        let store = store();
        let id = DocumentId::parse("overview").unwrap();
        store
            .append(&version("overview", "live", VersionReason::InitialGeneration))
            .unwrap();
        store
            .append(&version(
                "overview",
                "proposal",
                VersionReason::SupersededByEditConflict,
            ))
            .unwrap();

        assert_eq!(store.latest(&id).unwrap().unwrap().content, "proposal");
        assert_eq!(store.latest_live(&id).unwrap().unwrap().content, "live");
        assert_eq!(
            store.pending_superseded(&id).unwrap().unwrap().content,
            "proposal"
        );
    }

    #[test]
    fn test_tombstone_has_no_live_record() {
        let store = store();
        let id = DocumentId::parse("overview").unwrap();
        store
            .append(&version("overview", "live", VersionReason::InitialGeneration))
            .unwrap();
        store
            .append(&version("overview", "", VersionReason::Removed))
            .unwrap();

        assert!(store.latest_live(&id).unwrap().is_none());
        assert!(store.has_history(&id).unwrap());
    }

    #[test]
    fn test_histories_are_independent() {
        let store = store();
        store
            .append(&version("a", "a1", VersionReason::InitialGeneration))
            .unwrap();
        let b = store
            .append(&version("b", "b1", VersionReason::InitialGeneration))
            .unwrap();
        assert_eq!(b.seq, 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_unknown_reason_is_store_corruption() {
        let store = store();
        store
            .db
            .execute(
                "INSERT INTO versions (document_id, seq, content, content_hash, revision, created_at, reason, meta)
                 VALUES ('x', 1, '', ?1, 'r', '2025-01-01T00:00:00Z', 'mystery', '{}')",
                &[&content_hash(b"")],
            )
            .unwrap();

        let id = DocumentId::parse("x").unwrap();
        assert!(matches!(
            store.history(&id),
            Err(DocError::StoreCorruption(_))
        ));
    }
}
