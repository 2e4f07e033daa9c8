//! Dependency tracking: document → source edges and document → document references.

mod dependency;
mod paths;
mod references;

pub use dependency::{DependencyGraph, PartitionedPaths};
pub use paths::{DependencyPattern, normalize_path};
pub use references::{ReferenceIndex, RegenerationOrder, extract_wikilinks, order_by_references};
