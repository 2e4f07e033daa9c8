//! Durable state: registry, version history and commit locks in one SQLite file.

pub mod consistency;
pub mod database;
pub mod locks;
pub mod registry;
pub mod versions;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use consistency::{ConsistencyReport, check_and_repair};
pub use database::{Database, PoolConfig, SharedDatabase};
pub use locks::{CommitLockGuard, CommitLocks};
pub use registry::DocumentRegistry;
pub use versions::VersionStore;

use crate::constants::commit;
use crate::types::Result;

/// Explicitly passed handle to all persisted state.
///
/// Lifecycle: opened and verified at run start (`open` rebuilds the registry
/// from history if they disagree), mutated only through commit transactions.
#[derive(Clone)]
pub struct StateStore {
    pub db: SharedDatabase,
    pub registry: DocumentRegistry,
    pub versions: VersionStore,
    pub locks: CommitLocks,
}

impl StateStore {
    /// Open (creating if needed) and run the startup consistency check.
    pub fn open(path: &Path, stale_lock_after: Duration) -> Result<(Self, ConsistencyReport)> {
        let db = Database::open(path)?;
        Self::from_database(db, stale_lock_after)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        let (store, _) =
            Self::from_database(db, Duration::from_secs(commit::STALE_LOCK_SECS))?;
        Ok(store)
    }

    fn from_database(db: Database, stale_lock_after: Duration) -> Result<(Self, ConsistencyReport)> {
        db.initialize()?;
        let db = Arc::new(db);
        let report = check_and_repair(&db)?;

        Ok((
            Self {
                registry: DocumentRegistry::new(db.clone()),
                versions: VersionStore::new(db.clone()),
                locks: CommitLocks::new(db.clone(), stale_lock_after),
                db,
            },
            report,
        ))
    }

    /// Re-run the consistency check on demand.
    pub fn verify(&self) -> Result<ConsistencyReport> {
        check_and_repair(&self.db)
    }
}
