//! Document → source dependency graph.
//!
//! Bipartite relation between documents and source paths. An edge means the
//! document's content was derived from that path; declared directories and
//! globs cover every file beneath them.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::paths::DependencyPattern;
use crate::source::ChangeSet;
use crate::types::{DocError, Document, DocumentId, Result};

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: BTreeMap<DocumentId, Vec<DependencyPattern>>,
}

/// Validated paths plus the rejections, for callers that degrade to warnings.
pub struct PartitionedPaths {
    pub accepted: BTreeSet<String>,
    pub rejected: Vec<DocError>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from registry documents, including those with no dependencies.
    ///
    /// Stored edges were validated at commit time; any that no longer parse
    /// are dropped with a warning.
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Self {
        let mut graph = Self::new();
        for doc in documents {
            let patterns = doc
                .meta
                .dependencies
                .iter()
                .filter_map(|raw| match DependencyPattern::parse(raw) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(document = %doc.id, "Ignoring stored dependency: {}", e);
                        None
                    }
                })
                .collect();
            graph.edges.insert(doc.id.clone(), patterns);
        }
        graph
    }

    /// Validate every path, keeping the good ones.
    pub fn partition_paths<I, S>(paths: I) -> PartitionedPaths
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accepted = BTreeSet::new();
        let mut rejected = Vec::new();
        for raw in paths {
            match DependencyPattern::parse(raw.as_ref()) {
                Ok(p) => {
                    accepted.insert(p.as_str().to_string());
                }
                Err(e) => rejected.push(e),
            }
        }
        PartitionedPaths { accepted, rejected }
    }

    /// Replace the full edge set of one document.
    ///
    /// All-or-nothing: if any path is invalid the existing edges are kept.
    /// Returns the normalized edge set.
    pub fn record<I, S>(&mut self, id: &DocumentId, paths: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: BTreeMap<String, DependencyPattern> = BTreeMap::new();
        for raw in paths {
            let pattern = DependencyPattern::parse(raw.as_ref())?;
            patterns.insert(pattern.as_str().to_string(), pattern);
        }

        let normalized: BTreeSet<String> = patterns.keys().cloned().collect();
        self.edges
            .insert(id.clone(), patterns.into_values().collect());
        Ok(normalized)
    }

    pub fn remove(&mut self, id: &DocumentId) {
        self.edges.remove(id);
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.edges.contains_key(id)
    }

    pub fn dependencies(&self, id: &DocumentId) -> BTreeSet<String> {
        self.edges
            .get(id)
            .map(|patterns| patterns.iter().map(|p| p.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    /// Whether `id` is affected by `changes`.
    ///
    /// Documents with zero dependencies are affected by `ChangeSet::All`
    /// and by nothing else.
    pub fn is_affected(&self, id: &DocumentId, changes: &ChangeSet) -> bool {
        let patterns = self.edges.get(id).map(Vec::as_slice).unwrap_or_default();
        match changes {
            ChangeSet::All => true,
            ChangeSet::Files(files) => patterns
                .iter()
                .any(|pattern| files.iter().any(|f| pattern.matches(f))),
        }
    }

    /// Changed files covered by the document's declarations.
    pub fn matched_files(&self, id: &DocumentId, changes: &ChangeSet) -> Vec<String> {
        let (Some(patterns), Some(files)) = (self.edges.get(id), changes.files()) else {
            return Vec::new();
        };
        files
            .iter()
            .filter(|f| patterns.iter().any(|p| p.matches(f)))
            .cloned()
            .collect()
    }

    /// Every known document with at least one edge into `changes`.
    pub fn affected_documents(&self, changes: &ChangeSet) -> BTreeSet<DocumentId> {
        self.edges
            .keys()
            .filter(|id| self.is_affected(id, changes))
            .cloned()
            .collect()
    }

    /// Documents whose declarations cover `path`; used to report why a file matters.
    pub fn documents_depending_on(&self, path: &str) -> BTreeSet<DocumentId> {
        self.edges
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| p.matches(path)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(raw: &str) -> DocumentId {
        DocumentId::parse(raw).unwrap()
    }

    fn files(paths: &[&str]) -> ChangeSet {
        ChangeSet::Files(paths.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_record_is_idempotent_replacement() {
        let mut graph = DependencyGraph::new();
        graph.record(&id("overview"), ["README", "./README"]).unwrap();
        graph.record(&id("overview"), ["README"]).unwrap();
        assert_eq!(graph.dependencies(&id("overview")).len(), 1);

        graph.record(&id("overview"), ["src/"]).unwrap();
        assert_eq!(
            graph.dependencies(&id("overview")),
            ["src/".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn test_record_rejects_escape_and_keeps_edges() {
        let mut graph = DependencyGraph::new();
        graph.record(&id("overview"), ["README"]).unwrap();

        let err = graph
            .record(&id("overview"), ["src/", "../../etc/passwd"])
            .unwrap_err();
        assert!(matches!(err, DocError::InvalidDependencyPath { .. }));
        assert_eq!(graph.dependencies(&id("overview")).len(), 1);
    }

    #[test]
    fn test_affected_documents() {
        let mut graph = DependencyGraph::new();
        graph.record(&id("overview"), ["README"]).unwrap();
        graph.record(&id("architecture"), ["src/**"]).unwrap();
        graph.record(&id("api"), ["src/api/"]).unwrap();
        graph.record(&id("glossary"), Vec::<String>::new()).unwrap();

        let affected = graph.affected_documents(&files(&["src/core.py"]));
        assert_eq!(affected, [id("architecture")].into_iter().collect());

        let affected = graph.affected_documents(&files(&["src/api/routes.py"]));
        assert_eq!(affected, [id("api"), id("architecture")].into_iter().collect());

        assert_eq!(
            graph.matched_files(&id("api"), &files(&["README", "src/api/routes.py"])),
            vec!["src/api/routes.py".to_string()]
        );
    }

    #[test]
    fn test_zero_dependency_policy() {
        let mut graph = DependencyGraph::new();
        graph.record(&id("glossary"), Vec::<String>::new()).unwrap();

        assert!(graph.is_affected(&id("glossary"), &ChangeSet::All));
        assert!(!graph.is_affected(&id("glossary"), &files(&["README", "src/a.py"])));
    }

    #[test]
    fn test_partition_paths() {
        let partitioned = DependencyGraph::partition_paths(["src/", "/etc/passwd", "a/../b"]);
        assert_eq!(partitioned.accepted.len(), 2);
        assert_eq!(partitioned.rejected.len(), 1);
    }

    proptest! {
        /// A document is affected iff some changed file lies under one of its declared directories.
        #[test]
        fn prop_affected_matches_prefix_intersection(
            deps in proptest::collection::btree_set("[a-c]{1,2}(/[a-c]{1,2})?", 0..4),
            changed in proptest::collection::btree_set("[a-c]{1,2}/[a-c]{1,2}(/[a-c]{1,2})?", 0..6),
        ) {
            let mut graph = DependencyGraph::new();
            let doc = id("doc");
            graph.record(&doc, deps.iter()).unwrap();

            let expected = changed.iter().any(|file| {
                deps.iter().any(|dep| file == dep || file.starts_with(&format!("{}/", dep)))
            });
            let changes = ChangeSet::Files(changed.clone());
            prop_assert_eq!(graph.is_affected(&doc, &changes), expected);
        }
    }
}
