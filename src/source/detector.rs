//! Change Detector
//!
//! Computes, per revision marker, the files changed between that marker and
//! the head revision resolved once at the start of a run. Documents are
//! generated at different times, so the planner asks for one change set per
//! distinct marker; results are cached for the lifetime of the detector.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::repository::RepositorySource;
use crate::types::Result;

/// Files changed since a revision marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// No prior marker: every file is assumed to have changed
    All,
    Files(BTreeSet<String>),
}

impl ChangeSet {
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// True when nothing changed (never true for `All`).
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Files(files) if files.is_empty())
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Files(files) => Some(files.len()),
        }
    }

    pub fn files(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::Files(files) => Some(files),
        }
    }
}

pub struct ChangeDetector {
    source: Arc<dyn RepositorySource>,
    head: String,
    cache: DashMap<String, ChangeSet>,
}

impl ChangeDetector {
    /// Resolve the head revision and start with an empty cache.
    pub async fn new(source: Arc<dyn RepositorySource>) -> Result<Self> {
        let head = source.resolve_head_revision().await?;
        debug!(head = %head, "Resolved head revision");
        Ok(Self {
            source,
            head,
            cache: DashMap::new(),
        })
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn source(&self) -> &Arc<dyn RepositorySource> {
        &self.source
    }

    /// Changes between `revision` and head.
    ///
    /// `None` (first generation) yields `ChangeSet::All`. An unknown marker
    /// propagates `UnknownRevision`; callers treat that as unconditional
    /// staleness.
    pub async fn changes_since(&self, revision: Option<&str>) -> Result<ChangeSet> {
        let Some(revision) = revision.filter(|r| !r.is_empty()) else {
            return Ok(ChangeSet::All);
        };

        if revision == self.head {
            return Ok(ChangeSet::Files(BTreeSet::new()));
        }

        if let Some(cached) = self.cache.get(revision) {
            return Ok(cached.clone());
        }

        let files = self.source.diff(revision, &self.head).await?;
        debug!(
            from = revision,
            to = %self.head,
            changed = files.len(),
            "Computed change set"
        );

        let change_set = ChangeSet::Files(files);
        self.cache
            .insert(revision.to_string(), change_set.clone());
        Ok(change_set)
    }

    /// Union of changes across several markers; used for diff-focused scouting.
    pub async fn changes_since_any<'a>(
        &self,
        revisions: impl IntoIterator<Item = &'a str>,
    ) -> Result<ChangeSet> {
        let mut union = BTreeSet::new();
        for revision in revisions {
            match self.changes_since(Some(revision)).await? {
                ChangeSet::All => return Ok(ChangeSet::All),
                ChangeSet::Files(files) => union.extend(files),
            }
        }
        Ok(ChangeSet::Files(union))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryRepository;
    use crate::types::DocError;

    #[tokio::test]
    async fn test_first_generation_is_all() {
        let repo = Arc::new(MemoryRepository::new());
        repo.commit("r1", &[("README", "hi")]);
        let detector = ChangeDetector::new(repo).await.unwrap();

        assert_eq!(detector.changes_since(None).await.unwrap(), ChangeSet::All);
    }

    #[tokio::test]
    async fn test_changes_since_marker() {
        let repo = Arc::new(MemoryRepository::new());
        repo.commit("r1", &[("README", "hi"), ("src/core.py", "a")]);
        repo.commit("r2", &[("src/core.py", "b")]);
        let detector = ChangeDetector::new(repo.clone()).await.unwrap();

        assert_eq!(detector.head(), "r2");
        let changes = detector.changes_since(Some("r1")).await.unwrap();
        assert_eq!(
            changes.files().unwrap().iter().collect::<Vec<_>>(),
            vec!["src/core.py"]
        );
        assert!(detector.changes_since(Some("r2")).await.unwrap().is_empty());

        // Served from cache
        detector.changes_since(Some("r1")).await.unwrap();
        assert_eq!(repo.diff_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_revision_propagates() {
        let repo = Arc::new(MemoryRepository::new());
        repo.commit("r1", &[("README", "hi")]);
        let detector = ChangeDetector::new(repo).await.unwrap();

        assert!(matches!(
            detector.changes_since(Some("rewritten")).await,
            Err(DocError::UnknownRevision { .. })
        ));
    }
}
