//! Per-document advisory commit locks.
//!
//! Two runs (possibly in different processes) must never interleave commits
//! for the same document. A lock row in `commit_locks` marks ownership by
//! run id; it is held only across the commit step, never across an agent call.

use std::time::Duration;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, warn};

use super::database::SharedDatabase;
use crate::types::{DocError, DocumentId, Result, RunId, format_timestamp, parse_timestamp};

/// Lock table access.
#[derive(Clone)]
pub struct CommitLocks {
    db: SharedDatabase,
    stale_after: Duration,
}

impl CommitLocks {
    pub fn new(db: SharedDatabase, stale_after: Duration) -> Self {
        Self { db, stale_after }
    }

    /// Take the lock for `id` on behalf of `run_id`.
    ///
    /// Fails with `CommitRaceLost` when another run holds a fresh lock.
    /// Locks older than the staleness window are reclaimed.
    pub fn acquire(&self, id: &DocumentId, run_id: &RunId) -> Result<CommitLockGuard> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| DocError::Config(format!("stale lock window: {}", e)))?;

        self.db.transaction(|conn| {
            let holder: Option<(String, String)> = conn
                .query_row(
                    "SELECT run_id, acquired_at FROM commit_locks WHERE document_id = ?1",
                    params![id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((holder, acquired_at)) = holder
                && holder != run_id.as_str()
            {
                let acquired_at = parse_timestamp(&acquired_at)
                    .map_err(|e| DocError::Storage(format!("bad lock row: {}", e)))?;
                if Utc::now() - acquired_at < stale_after {
                    return Err(DocError::CommitRaceLost {
                        document_id: id.to_string(),
                        holder,
                    });
                }
                warn!(
                    document = %id,
                    holder = %holder,
                    "Reclaiming stale commit lock"
                );
            }

            conn.execute(
                "INSERT INTO commit_locks (document_id, run_id, acquired_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(document_id) DO UPDATE SET
                     run_id = excluded.run_id,
                     acquired_at = excluded.acquired_at",
                params![id.as_str(), run_id.as_str(), format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })?;

        debug!(document = %id, run = %run_id, "Acquired commit lock");

        Ok(CommitLockGuard {
            db: self.db.clone(),
            document_id: id.clone(),
            run_id: run_id.clone(),
            released: false,
        })
    }

    /// Current holder of a lock, if any.
    pub fn holder(&self, id: &DocumentId) -> Result<Option<String>> {
        let conn = self.db.connection()?;
        let holder = conn
            .query_row(
                "SELECT run_id FROM commit_locks WHERE document_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(holder)
    }

    /// Drop every lock owned by a run (cleanup after an aborted run).
    pub fn release_all(&self, run_id: &RunId) -> Result<usize> {
        self.db.execute(
            "DELETE FROM commit_locks WHERE run_id = ?1",
            &[&run_id.as_str()],
        )
    }
}

/// Held commit lock; released on `release()` or drop.
pub struct CommitLockGuard {
    db: SharedDatabase,
    document_id: DocumentId,
    run_id: RunId,
    released: bool,
}

impl CommitLockGuard {
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.delete()
    }

    fn delete(&self) -> Result<()> {
        self.db.execute(
            "DELETE FROM commit_locks WHERE document_id = ?1 AND run_id = ?2",
            &[&self.document_id.as_str(), &self.run_id.as_str()],
        )?;
        debug!(document = %self.document_id, "Released commit lock");
        Ok(())
    }
}

impl Drop for CommitLockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.delete()
        {
            warn!(document = %self.document_id, "Failed to release commit lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use std::sync::Arc;

    fn locks(stale_after: Duration) -> CommitLocks {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        CommitLocks::new(Arc::new(db), stale_after)
    }

    #[test]
    fn test_second_run_loses_race() {
        let locks = locks(Duration::from_secs(600));
        let id = DocumentId::parse("overview").unwrap();
        let run_a = RunId::new("a");
        let run_b = RunId::new("b");

        let guard = locks.acquire(&id, &run_a).unwrap();
        match locks.acquire(&id, &run_b) {
            Err(DocError::CommitRaceLost { holder, .. }) => assert_eq!(holder, "a"),
            other => panic!("expected CommitRaceLost, got {:?}", other.map(|_| ())),
        }

        guard.release().unwrap();
        assert!(locks.acquire(&id, &run_b).is_ok());
    }

    #[test]
    fn test_guard_drop_releases() {
        let locks = locks(Duration::from_secs(600));
        let id = DocumentId::parse("overview").unwrap();
        {
            let _guard = locks.acquire(&id, &RunId::new("a")).unwrap();
            assert_eq!(locks.holder(&id).unwrap().as_deref(), Some("a"));
        }
        assert!(locks.holder(&id).unwrap().is_none());
    }

    #[test]
    fn test_stale_lock_reclaimed() {
        let locks = locks(Duration::from_secs(0));
        let id = DocumentId::parse("overview").unwrap();

        let abandoned = locks.acquire(&id, &RunId::new("crashed")).unwrap();
        std::mem::forget(abandoned);

        let guard = locks.acquire(&id, &RunId::new("fresh")).unwrap();
        assert_eq!(locks.holder(&id).unwrap().as_deref(), Some("fresh"));
        drop(guard);
    }

    #[test]
    fn test_locks_are_per_document() {
        let locks = locks(Duration::from_secs(600));
        let _a = locks
            .acquire(&DocumentId::parse("a").unwrap(), &RunId::new("one"))
            .unwrap();
        assert!(
            locks
                .acquire(&DocumentId::parse("b").unwrap(), &RunId::new("two"))
                .is_ok()
        );
    }
}
