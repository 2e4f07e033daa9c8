//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::{Config, ConfigLoader};
use crate::constants::layout;
use crate::source::{GitRepository, RepoReference, RepositorySource};
use crate::storage::{ConsistencyReport, StateStore};
use crate::types::{DocError, Result};

/// Command execution context
///
/// Created via `CommandContext::load()` for commands that touch state.
#[derive(Clone)]
pub struct CommandContext {
    /// Project data directory (.docweave)
    pub data_dir: PathBuf,
    pub store: StateStore,
    pub config: Config,
    /// Repository root; the current directory
    pub project_root: PathBuf,
}

impl CommandContext {
    /// Validate initialization, load config and open the state store.
    ///
    /// Opening runs the consistency check; a rebuild is logged, not fatal.
    pub fn load() -> Result<Self> {
        Self::load_with_report().map(|(ctx, _)| ctx)
    }

    /// Like `load`, also returning what the startup consistency check found.
    pub fn load_with_report() -> Result<(Self, ConsistencyReport)> {
        let data_dir = require_initialized()?;
        let config = ConfigLoader::load_for(&data_dir)?;
        let project_root = std::env::current_dir()?;

        let (store, report) = open_store(&data_dir, &config)?;
        if report.rebuilt {
            warn!(
                mismatches = report.mismatches.len(),
                "Registry disagreed with history and was rebuilt"
            );
        }

        Ok((
            Self {
                data_dir,
                store,
                config,
                project_root,
            },
            report,
        ))
    }

    /// Where documents are written
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(&self.config.generation.output_dir)
    }

    /// The repository documents are generated from.
    ///
    /// `project.repo_url` names it in trailers when set; otherwise the local
    /// checkout path does.
    pub fn repository(&self) -> Result<Arc<dyn RepositorySource>> {
        let reference = match &self.config.project.repo_url {
            Some(url) => RepoReference::parse(url)?,
            None => RepoReference::parse(&self.project_root.display().to_string())?,
        };
        let repository = GitRepository::open(&self.project_root, reference.as_string())?
            .with_name(reference.display_name());
        Ok(Arc::new(repository))
    }
}

pub fn open_store(data_dir: &Path, config: &Config) -> Result<(StateStore, ConsistencyReport)> {
    let db_path = data_dir.join(layout::STATE_DB_PATH);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    StateStore::open(
        &db_path,
        Duration::from_secs(config.generation.stale_lock_secs),
    )
}

/// Require docweave to be initialized
///
/// Returns the data directory path, or `DocError::NotInitialized`.
pub fn require_initialized() -> Result<PathBuf> {
    let data_dir = data_dir();
    if !data_dir.exists() {
        return Err(DocError::NotInitialized);
    }
    Ok(data_dir)
}

/// Data directory path (without validation)
pub fn data_dir() -> PathBuf {
    PathBuf::from(layout::DATA_DIR)
}

pub fn is_initialized() -> bool {
    data_dir().exists()
}

/// `--format` values accepted by listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_store_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let (store, report) = open_store(dir.path(), &Config::default()).unwrap();

        assert!(dir.path().join(layout::STATE_DB_PATH).exists());
        assert!(report.is_consistent());
        assert_eq!(store.versions.count().unwrap(), 0);
    }
}
