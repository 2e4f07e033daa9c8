//! Source repository access and change detection.

mod detector;
mod reference;
mod repository;

pub use detector::{ChangeDetector, ChangeSet};
pub use reference::RepoReference;
pub use repository::{GitRepository, RepositorySource};
