//! Dependency path validation and matching.
//!
//! Paths come from scout and writer output, so they are untrusted: the only
//! operations performed on them are normalization, prefix matching and glob
//! matching. Anything that would resolve outside the repository root is
//! rejected with `InvalidDependencyPath`.

use std::fmt;

use glob::{MatchOptions, Pattern};

use crate::types::{DocError, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Normalize a repository-relative path.
///
/// `./` and empty segments are dropped, `..` is resolved lexically and must
/// never climb above the root. A trailing `/` (directory marker) is kept.
pub fn normalize_path(raw: &str) -> Result<String> {
    let reject = |reason: &str| DocError::InvalidDependencyPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(reject("empty path"));
    }
    if trimmed.contains('\0') {
        return Err(reject("contains NUL byte"));
    }

    let unified = trimmed.replace('\\', "/");
    if unified.starts_with('/') || unified.starts_with('~') {
        return Err(reject("absolute path"));
    }
    if unified.len() >= 2 && unified.as_bytes()[1] == b':' {
        return Err(reject("absolute path"));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(reject("escapes repository root"));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(reject("refers to the repository root itself"));
    }

    let mut normalized = segments.join("/");
    if unified.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// A validated dependency declaration.
#[derive(Debug, Clone)]
pub enum DependencyPattern {
    /// A file, or a directory covering everything beneath it
    Path(String),
    /// Glob such as `src/**` or `docs/*.md`
    Glob(Pattern, String),
}

impl DependencyPattern {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize_path(raw)?;
        if is_glob(&normalized) {
            let pattern = Pattern::new(&normalized).map_err(|e| DocError::InvalidDependencyPath {
                path: raw.to_string(),
                reason: format!("invalid glob: {}", e),
            })?;
            Ok(Self::Glob(pattern, normalized))
        } else {
            Ok(Self::Path(normalized))
        }
    }

    /// Canonical text stored as the edge.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(p) => p,
            Self::Glob(_, raw) => raw,
        }
    }

    /// Whether a changed file (already normalized) falls under this declaration.
    pub fn matches(&self, changed: &str) -> bool {
        match self {
            Self::Path(p) => {
                let base = p.trim_end_matches('/');
                changed == base
                    || changed
                        .strip_prefix(base)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Glob(pattern, _) => pattern.matches_with(changed, MATCH_OPTIONS),
        }
    }
}

impl fmt::Display for DependencyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src//api/").unwrap(), "src/api/");
        assert_eq!(normalize_path("src/a/../b.rs").unwrap(), "src/b.rs");
        assert_eq!(normalize_path("src\\win.rs").unwrap(), "src/win.rs");
    }

    #[test]
    fn test_escaping_paths_rejected() {
        for bad in ["../etc/passwd", "src/../../x", "/etc/passwd", "~/x", "C:/x", "", ".", "a/.."] {
            assert!(
                matches!(
                    normalize_path(bad),
                    Err(DocError::InvalidDependencyPath { .. })
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_directory_prefix_matching() {
        let dir = DependencyPattern::parse("src/api/").unwrap();
        assert!(dir.matches("src/api/routes.rs"));
        assert!(dir.matches("src/api/v2/users.rs"));
        assert!(!dir.matches("src/apis/x.rs"));

        let bare = DependencyPattern::parse("src/api").unwrap();
        assert!(bare.matches("src/api"));
        assert!(bare.matches("src/api/routes.rs"));
        assert!(!bare.matches("src/api_old.rs"));
    }

    #[test]
    fn test_glob_matching() {
        let all = DependencyPattern::parse("src/**").unwrap();
        assert!(all.matches("src/core.py"));
        assert!(all.matches("src/deep/nested/mod.py"));
        assert!(!all.matches("README"));

        let md = DependencyPattern::parse("docs/*.md").unwrap();
        assert!(md.matches("docs/a.md"));
        assert!(!md.matches("docs/sub/a.md"));
    }

    proptest! {
        #[test]
        fn prop_normalized_paths_stay_inside_root(raw in "[a-z./]{1,24}") {
            if let Ok(path) = normalize_path(&raw) {
                prop_assert!(!path.starts_with('/'));
                prop_assert!(!path.split('/').any(|s| s == ".."));
                prop_assert!(!path.is_empty());
            }
        }

        #[test]
        fn prop_file_matches_its_parent_directories(
            segments in proptest::collection::vec("[a-z]{1,6}", 2..6)
        ) {
            let file = segments.join("/");
            for depth in 1..segments.len() {
                let dir = format!("{}/", segments[..depth].join("/"));
                prop_assert!(DependencyPattern::parse(&dir).unwrap().matches(&file));
            }
        }
    }
}
