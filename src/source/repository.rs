//! Repository access behind a trait so the core can run against git or a fake.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::constants::network;
use crate::graph::normalize_path;
use crate::types::{DocError, Result};

/// Read-only view of a source repository.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Reference written into document trailers (URL or local path)
    fn reference(&self) -> &str;

    /// Short display name (e.g. `owner/repo` or the directory name)
    fn name(&self) -> &str;

    async fn resolve_head_revision(&self) -> Result<String>;

    /// Files that differ between two revisions (added, removed or modified).
    ///
    /// Fails with `UnknownRevision` when `from` is not in history.
    async fn diff(&self, from: &str, to: &str) -> Result<BTreeSet<String>>;

    /// Contents of a repository-relative file at the working tree.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Tracked files at the working tree.
    async fn list_files(&self) -> Result<Vec<String>>;
}

/// Local checkout driven through the `git` CLI.
pub struct GitRepository {
    root: PathBuf,
    reference: String,
    name: String,
    timeout: Duration,
}

impl GitRepository {
    pub fn open(root: impl Into<PathBuf>, reference: impl Into<String>) -> Result<Self> {
        let root = root.into();
        if !root.join(".git").exists() {
            return Err(DocError::InvalidRepository {
                reference: root.display().to_string(),
                reason: "not a git repository (no .git)".to_string(),
            });
        }

        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "repository".to_string());

        Ok(Self {
            root,
            reference: reference.into(),
            name,
            timeout: Duration::from_secs(network::GIT_TIMEOUT_SECS),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!("git {}", args.join(" "));

        let child = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DocError::Git(format!("Failed to spawn git: {}", e)))?;

        timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DocError::timeout(format!("git {}", args.join(" ")), self.timeout))?
            .map_err(|e| DocError::Git(format!("git {} failed: {}", args.join(" "), e)))
    }

    async fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(DocError::Git(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn has_commit(&self, revision: &str) -> Result<bool> {
        let spec = format!("{}^{{commit}}", revision);
        let output = self.git(&["cat-file", "-e", &spec]).await?;
        Ok(output.status.success())
    }
}

#[async_trait]
impl RepositorySource for GitRepository {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_head_revision(&self) -> Result<String> {
        let head = self.git_stdout(&["rev-parse", "HEAD"]).await?;
        Ok(head.trim().to_string())
    }

    async fn diff(&self, from: &str, to: &str) -> Result<BTreeSet<String>> {
        // Revision markers are stored data; never let one be read as an option
        if from.starts_with('-') || !self.has_commit(from).await? {
            return Err(DocError::unknown_revision(from));
        }

        let stdout = self
            .git_stdout(&["diff", "--name-only", "--no-renames", "-z", from, to, "--"])
            .await?;

        Ok(null_separated(&stdout).collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let relative = normalize_path(path)?;
        Ok(tokio::fs::read(self.root.join(relative.trim_end_matches('/'))).await?)
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let stdout = self.git_stdout(&["ls-files", "-z"]).await?;
        Ok(null_separated(&stdout).collect())
    }
}

/// Paths from `-z` output, which git leaves unquoted even when non-ASCII.
fn null_separated(stdout: &str) -> impl Iterator<Item = String> + '_ {
    stdout
        .split('\0')
        .filter(|path| !path.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyPattern;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Builds a two-commit repository; `None` when git is unavailable.
    fn fixture() -> Option<(TempDir, String, String)> {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        if !git(root, &["init", "-q"]) {
            return None;
        }
        git(root, &["config", "user.email", "test@example.com"]);
        git(root, &["config", "user.name", "test"]);

        std::fs::write(root.join("README"), "hello").unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/core.py"), "x = 1").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "one"]);
        let r1 = head(root);

        std::fs::write(root.join("src/core.py"), "x = 2").unwrap();
        git(root, &["commit", "-q", "-am", "two"]);
        let r2 = head(root);

        Some((dir, r1, r2))
    }

    fn head(root: &Path) -> String {
        let out = std::process::Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["rev-parse", "HEAD"])
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    #[tokio::test]
    async fn test_git_diff_and_head() {
        let Some((dir, r1, r2)) = fixture() else {
            return;
        };
        let repo = GitRepository::open(dir.path(), "local").unwrap();

        assert_eq!(repo.resolve_head_revision().await.unwrap(), r2);
        let changed = repo.diff(&r1, &r2).await.unwrap();
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["src/core.py"]);

        let files = repo.list_files().await.unwrap();
        assert!(files.contains(&"README".to_string()));
    }

    #[tokio::test]
    async fn test_non_ascii_paths_are_unquoted() {
        let Some((dir, _, r2)) = fixture() else {
            return;
        };
        let root = dir.path();
        std::fs::write(root.join("src/café.py"), "y = 1").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "three"]);
        let r3 = head(root);

        let repo = GitRepository::open(root, "local").unwrap();
        let changed = repo.diff(&r2, &r3).await.unwrap();
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["src/café.py"]);
        assert!(
            DependencyPattern::parse("src/café.py")
                .unwrap()
                .matches("src/café.py")
        );

        let files = repo.list_files().await.unwrap();
        assert!(files.contains(&"src/café.py".to_string()));
    }

    #[test]
    fn test_null_separated_output() {
        let paths: Vec<String> = null_separated("a b.txt\0src/caf\u{e9}.py\0").collect();
        assert_eq!(paths, vec!["a b.txt", "src/café.py"]);
    }

    #[tokio::test]
    async fn test_unknown_revision() {
        let Some((dir, _, r2)) = fixture() else {
            return;
        };
        let repo = GitRepository::open(dir.path(), "local").unwrap();
        let err = repo
            .diff("0123456789abcdef0123456789abcdef01234567", &r2)
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::UnknownRevision { .. }));

        let err = repo.diff("--output=/tmp/x", &r2).await.unwrap_err();
        assert!(matches!(err, DocError::UnknownRevision { .. }));
    }

    #[tokio::test]
    async fn test_read_file_rejects_escape() {
        let Some((dir, _, _)) = fixture() else {
            return;
        };
        let repo = GitRepository::open(dir.path(), "local").unwrap();
        assert_eq!(repo.read_file("README").await.unwrap(), b"hello");
        assert!(matches!(
            repo.read_file("../outside").await,
            Err(DocError::InvalidDependencyPath { .. })
        ));
    }

    #[test]
    fn test_open_requires_git_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            GitRepository::open(dir.path(), "x"),
            Err(DocError::InvalidRepository { .. })
        ));
    }
}
