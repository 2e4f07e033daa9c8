//! Cross-references between documents and best-effort regeneration ordering.
//!
//! A document that references another should be rewritten after its referent
//! when both are stale. References may form cycles; those are broken by
//! falling back to declaration order and reported, never treated as errors.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{DocumentId, slugify};

static WIKILINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]\|#\n]+)(?:[#\|][^\]\n]*)?\]\]").ok());

/// Targets of every `[[wikilink]]` in `content`, in order of first appearance.
pub fn extract_wikilinks(content: &str) -> Vec<String> {
    let Some(wikilink) = WIKILINK.as_ref() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    wikilink
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|target| !target.is_empty() && seen.insert(target.clone()))
        .collect()
}

/// Resolves link targets to document ids by id or by title (case-insensitive).
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_key: HashMap<String, DocumentId>,
}

impl ReferenceIndex {
    pub fn new<'a>(documents: impl IntoIterator<Item = (&'a DocumentId, &'a str)>) -> Self {
        let mut by_key = HashMap::new();
        for (id, title) in documents {
            by_key.insert(id.as_str().to_string(), id.clone());
            if let Some(leaf) = id.as_str().rsplit('/').next() {
                by_key.entry(leaf.to_string()).or_insert_with(|| id.clone());
            }
            let title_key = slugify(title);
            if !title_key.is_empty() {
                by_key.entry(title_key).or_insert_with(|| id.clone());
            }
        }
        Self { by_key }
    }

    pub fn resolve(&self, target: &str) -> Option<&DocumentId> {
        self.by_key
            .get(target)
            .or_else(|| self.by_key.get(&slugify(target)))
    }

    /// Resolve every target, dropping unknown ones and self-references.
    pub fn resolve_all<I, S>(&self, from: &DocumentId, targets: I) -> BTreeSet<DocumentId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        targets
            .into_iter()
            .filter_map(|t| self.resolve(t.as_ref()).cloned())
            .filter(|id| id != from)
            .collect()
    }
}

/// Result of ordering a stale set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegenerationOrder {
    /// Regeneration order: referents before referrers where possible
    pub order: Vec<DocumentId>,
    /// Members of reference cycles, appended to `order` in declaration order
    pub cycle: Vec<DocumentId>,
}

/// Kahn's algorithm over the stale set only, seeded in declaration order.
///
/// `references[a]` contains `b` when `a` cites `b`. Edges to documents
/// outside `stale` are ignored: those referents are already current.
pub fn order_by_references(
    stale: &[DocumentId],
    references: &BTreeMap<DocumentId, BTreeSet<DocumentId>>,
) -> RegenerationOrder {
    let position: HashMap<&DocumentId, usize> =
        stale.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut indegree = vec![0usize; stale.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stale.len()];

    for (i, id) in stale.iter().enumerate() {
        let Some(cited) = references.get(id) else {
            continue;
        };
        for referent in cited {
            if let Some(&j) = position.get(referent)
                && j != i
            {
                indegree[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..stale.len()).filter(|&i| indegree[i] == 0).collect();
    let mut emitted = vec![false; stale.len()];
    let mut order = Vec::with_capacity(stale.len());

    while let Some(i) = ready.pop_front() {
        emitted[i] = true;
        order.push(stale[i].clone());

        let mut unlocked = Vec::new();
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                unlocked.push(d);
            }
        }
        // Keep declaration order among newly ready documents
        unlocked.sort_unstable();
        for d in unlocked {
            let pos = ready.iter().position(|&r| r > d).unwrap_or(ready.len());
            ready.insert(pos, d);
        }
    }

    let cycle: Vec<DocumentId> = (0..stale.len())
        .filter(|&i| !emitted[i])
        .map(|i| stale[i].clone())
        .collect();
    order.extend(cycle.iter().cloned());

    RegenerationOrder { order, cycle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(raw: &str) -> DocumentId {
        DocumentId::parse(raw).unwrap()
    }

    fn refs(pairs: &[(&str, &str)]) -> BTreeMap<DocumentId, BTreeSet<DocumentId>> {
        let mut map: BTreeMap<DocumentId, BTreeSet<DocumentId>> = BTreeMap::new();
        for (from, to) in pairs {
            map.entry(id(from)).or_default().insert(id(to));
        }
        map
    }

    #[test]
    fn test_extract_wikilinks() {
        let content = "See [[Architecture]] and [[api/routes|the routes]], \
                       again [[Architecture#layers]]. Not [single] or [[]].";
        assert_eq!(extract_wikilinks(content), vec!["Architecture", "api/routes"]);
    }

    #[test]
    fn test_reference_index_resolves_ids_and_titles() {
        let arch = id("backend/architecture");
        let overview = id("overview");
        let index = ReferenceIndex::new([
            (&arch, "System Architecture"),
            (&overview, "Overview"),
        ]);

        assert_eq!(index.resolve("backend/architecture"), Some(&arch));
        assert_eq!(index.resolve("architecture"), Some(&arch));
        assert_eq!(index.resolve("System Architecture"), Some(&arch));
        assert_eq!(index.resolve("OVERVIEW"), Some(&overview));
        assert!(index.resolve("missing").is_none());

        let resolved = index.resolve_all(&overview, ["Overview", "architecture", "nope"]);
        assert_eq!(resolved, [arch].into_iter().collect());
    }

    #[test]
    fn test_referents_first() {
        let stale = vec![id("overview"), id("architecture"), id("api")];
        let ordering = order_by_references(
            &stale,
            &refs(&[("overview", "architecture"), ("architecture", "api")]),
        );
        assert_eq!(ordering.order, vec![id("api"), id("architecture"), id("overview")]);
        assert!(ordering.cycle.is_empty());
    }

    #[test]
    fn test_declaration_order_kept_without_edges() {
        let stale = vec![id("c"), id("a"), id("b")];
        let ordering = order_by_references(&stale, &BTreeMap::new());
        assert_eq!(ordering.order, stale);
    }

    #[test]
    fn test_references_outside_stale_set_ignored() {
        let stale = vec![id("overview")];
        let ordering = order_by_references(&stale, &refs(&[("overview", "fresh")]));
        assert_eq!(ordering.order, stale);
    }

    #[test]
    fn test_cycle_falls_back_to_declaration_order() {
        let stale = vec![id("intro"), id("a"), id("b"), id("c")];
        let ordering = order_by_references(
            &stale,
            &refs(&[("a", "b"), ("b", "c"), ("c", "a"), ("intro", "a")]),
        );
        assert_eq!(ordering.cycle, vec![id("intro"), id("a"), id("b"), id("c")]);
        assert_eq!(ordering.order, ordering.cycle);

        let stale = vec![id("x"), id("a"), id("b")];
        let ordering = order_by_references(&stale, &refs(&[("a", "b"), ("b", "a")]));
        assert_eq!(ordering.order, vec![id("x"), id("a"), id("b")]);
        assert_eq!(ordering.cycle, vec![id("a"), id("b")]);
    }

    proptest! {
        #[test]
        fn prop_order_is_permutation_respecting_acyclic_edges(
            n in 1usize..8,
            raw_edges in proptest::collection::vec((0usize..8, 0usize..8), 0..16),
        ) {
            let stale: Vec<DocumentId> = (0..n).map(|i| id(&format!("d{}", i))).collect();
            // Only edges from higher to lower index: guaranteed acyclic
            let mut references: BTreeMap<DocumentId, BTreeSet<DocumentId>> = BTreeMap::new();
            for (a, b) in raw_edges {
                if a < n && b < n && a > b {
                    references.entry(stale[a].clone()).or_default().insert(stale[b].clone());
                }
            }

            let ordering = order_by_references(&stale, &references);
            prop_assert!(ordering.cycle.is_empty());

            let mut sorted = ordering.order.clone();
            sorted.sort();
            let mut expected = stale.clone();
            expected.sort();
            prop_assert_eq!(sorted, expected);

            let pos: HashMap<&DocumentId, usize> =
                ordering.order.iter().enumerate().map(|(i, d)| (d, i)).collect();
            for (from, cited) in &references {
                for to in cited {
                    prop_assert!(pos[to] < pos[from]);
                }
            }
        }
    }
}
