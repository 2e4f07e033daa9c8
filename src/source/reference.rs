//! Repository reference validation.
//!
//! Accepts either an HTTPS URL on an allowed host (`https://host/owner/repo`)
//! or a path to a local git checkout.

use std::path::{Path, PathBuf};

use url::Url;

use crate::constants::validation::{ALLOWED_HOSTS, MAX_REPO_URL_LEN};
use crate::types::{DocError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoReference {
    Remote {
        /// Sanitized `https://host/owner/repo`
        url: String,
        owner: String,
        repo: String,
    },
    Local {
        path: PathBuf,
    },
}

impl RepoReference {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.starts_with("https://") || raw.contains("://") {
            Self::parse_remote(raw)
        } else {
            Self::parse_local(Path::new(raw))
        }
    }

    fn parse_remote(raw: &str) -> Result<Self> {
        let reject = |reason: String| DocError::InvalidRepository {
            reference: raw.to_string(),
            reason,
        };

        if raw.is_empty() || raw.len() > MAX_REPO_URL_LEN {
            return Err(reject("invalid URL length".to_string()));
        }

        let url = Url::parse(raw).map_err(|e| reject(format!("invalid URL: {}", e)))?;
        if url.scheme() != "https" {
            return Err(reject("only HTTPS URLs are allowed".to_string()));
        }

        let host = url.host_str().unwrap_or_default();
        if !ALLOWED_HOSTS.contains(&host) {
            return Err(reject(format!(
                "host not allowed (allowed: {})",
                ALLOWED_HOSTS.join(", ")
            )));
        }

        let parts: Vec<&str> = url
            .path()
            .trim_matches('/')
            .split('/')
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 2 {
            return Err(reject("expected owner/repo path".to_string()));
        }

        let valid_part = |part: &str| {
            part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        };
        if !valid_part(parts[0]) || !valid_part(parts[1]) {
            return Err(reject("invalid path component".to_string()));
        }

        let owner = parts[0].to_string();
        let repo = parts[1].trim_end_matches(".git").to_string();
        Ok(Self::Remote {
            url: format!("https://{}/{}/{}", host, owner, repo),
            owner,
            repo,
        })
    }

    fn parse_local(path: &Path) -> Result<Self> {
        let reject = |reason: &str| DocError::InvalidRepository {
            reference: path.display().to_string(),
            reason: reason.to_string(),
        };

        if !path.exists() {
            return Err(reject("path does not exist"));
        }
        if !path.is_dir() {
            return Err(reject("path is not a directory"));
        }
        if !path.join(".git").exists() {
            return Err(reject("not a git repository (no .git)"));
        }

        let path = path.canonicalize()?;
        Ok(Self::Local { path })
    }

    /// Reference string written into document trailers.
    pub fn as_string(&self) -> String {
        match self {
            Self::Remote { url, .. } => url.clone(),
            Self::Local { path } => path.display().to_string(),
        }
    }

    /// Display name used in trailers and prompts.
    pub fn display_name(&self) -> String {
        match self {
            Self::Remote { owner, repo, .. } => format!("{}/{}", owner, repo),
            Self::Local { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "repository".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remote_sanitized() {
        let reference =
            RepoReference::parse("https://github.com/acme/widgets.git/tree/main").unwrap();
        assert_eq!(
            reference,
            RepoReference::Remote {
                url: "https://github.com/acme/widgets".to_string(),
                owner: "acme".to_string(),
                repo: "widgets".to_string(),
            }
        );
        assert_eq!(reference.display_name(), "acme/widgets");
    }

    #[test]
    fn test_remote_rejections() {
        for bad in [
            "http://github.com/acme/widgets",
            "https://evil.example.com/acme/widgets",
            "https://github.com/acme",
            "https://github.com/acme/wid$gets",
            "ssh://github.com/acme/widgets",
        ] {
            assert!(
                matches!(
                    RepoReference::parse(bad),
                    Err(DocError::InvalidRepository { .. })
                ),
                "{} should be rejected",
                bad
            );
        }

        let long = format!("https://github.com/acme/{}", "x".repeat(600));
        assert!(RepoReference::parse(&long).is_err());
    }

    #[test]
    fn test_local_requires_git_dir() {
        let dir = TempDir::new().unwrap();
        assert!(RepoReference::parse(dir.path().to_str().unwrap()).is_err());

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let reference = RepoReference::parse(dir.path().to_str().unwrap()).unwrap();
        assert!(matches!(reference, RepoReference::Local { .. }));
    }
}
