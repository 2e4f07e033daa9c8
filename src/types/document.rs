//! Document and version record types.
//!
//! A `Document` is the registry's view of one generated page; a
//! `VersionRecord` is an immutable snapshot in the append-only history.
//! Both carry a `DocumentMeta` so the registry can be rebuilt from history.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{DocError, Result};

const MAX_COLLECTION_LEN: usize = 200;

// =============================================================================
// Document Identity
// =============================================================================

/// Stable slug identifying a document across runs.
///
/// Shape: `segment` or `collection/.../segment`, each segment `[a-z0-9-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Build an id from an optional collection prefix and a name (title, type or raw id).
    pub fn from_parts(collection: &str, name: &str) -> Result<Self> {
        let collection = validate_collection(collection)?;
        let leaf = slugify(name);
        if leaf.is_empty() {
            return Err(DocError::InvalidDocumentId {
                id: name.to_string(),
                reason: "name has no alphanumeric characters".to_string(),
            });
        }

        let mut segments: Vec<String> = collection
            .split('/')
            .filter(|s| !s.is_empty())
            .map(slugify)
            .filter(|s| !s.is_empty())
            .collect();
        segments.push(leaf);
        Ok(Self(segments.join("/")))
    }

    /// Parse an already-formed id (e.g. from the registry or CLI).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.starts_with('/') || raw.ends_with('/') {
            return Err(DocError::InvalidDocumentId {
                id: raw.to_string(),
                reason: "empty segment".to_string(),
            });
        }
        for segment in raw.split('/') {
            if segment.is_empty() || slugify(segment) != segment {
                return Err(DocError::InvalidDocumentId {
                    id: raw.to_string(),
                    reason: format!("segment '{}' is not a slug", segment),
                });
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative markdown file location for this document
    pub fn file_name(&self) -> String {
        format!("{}.md", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase slug: alphanumerics kept, every other run collapses to a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Validate a collection prefix against path traversal and normalize it.
///
/// Empty means the output root.
pub fn validate_collection(collection: &str) -> Result<String> {
    if collection.is_empty() {
        return Ok(String::new());
    }

    let reject = |reason: &str| DocError::InvalidDocumentId {
        id: collection.to_string(),
        reason: reason.to_string(),
    };

    if collection.len() > MAX_COLLECTION_LEN {
        return Err(reject("collection name too long"));
    }
    if collection.contains("..") || collection.starts_with('/') {
        return Err(reject("path traversal detected"));
    }

    // "." segments are dropped; dots anywhere else are rejected
    let segments: Vec<&str> = collection
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    let valid = |c: char| c.is_alphanumeric() || c == '_' || c == '-';
    if !segments.iter().all(|segment| segment.chars().all(valid)) {
        return Err(reject("invalid characters in collection"));
    }

    Ok(segments.join("/"))
}

/// Lowercase hex SHA-256 of persisted bytes.
pub fn content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

// =============================================================================
// Document
// =============================================================================

/// Descriptive attributes shared by registry rows and version records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DocumentMeta {
    pub title: String,
    pub doc_type: String,
    pub collection: String,
    /// Source repository reference (URL or local path)
    pub repo_ref: String,
    /// Location relative to the output directory
    pub file_path: String,
    /// Declared source dependencies (files, directories, or globs)
    pub dependencies: BTreeSet<String>,
    /// Ids of documents this one cross-references
    pub references: BTreeSet<String>,
    /// Planner outline, reused when the planner omits a stale document
    pub outline: String,
}

/// Registry entry: the current machine-written state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub meta: DocumentMeta,
    /// Full persisted file content (body + trailer) as last written by the machine
    pub content: String,
    /// Hash of `content`; recomputed on every write
    pub content_hash: String,
    /// Revision marker this content was generated against
    pub revision: String,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Set when a human edit was detected and is not yet reconciled
    pub human_edited: bool,
}

impl Document {
    /// Hash check used by the consistency verifier.
    pub fn hash_is_current(&self) -> bool {
        content_hash(self.content.as_bytes()) == self.content_hash
    }
}

// =============================================================================
// Version Records
// =============================================================================

/// Why a version record was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionReason {
    InitialGeneration,
    SourceChanged,
    ManualRegeneration,
    SupersededByEditConflict,
    ConflictAccepted,
    HumanEditAdopted,
    Removed,
}

impl VersionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialGeneration => "initial-generation",
            Self::SourceChanged => "source-changed",
            Self::ManualRegeneration => "manual-regeneration",
            Self::SupersededByEditConflict => "superseded-by-edit-conflict",
            Self::ConflictAccepted => "conflict-accepted",
            Self::HumanEditAdopted => "human-edit-adopted",
            Self::Removed => "removed",
        }
    }

    /// Whether a record with this reason describes the live document.
    ///
    /// Superseded records hold proposed content only; tombstones hold nothing.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::SupersededByEditConflict | Self::Removed)
    }
}

impl fmt::Display for VersionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VersionReason {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initial-generation" => Ok(Self::InitialGeneration),
            "source-changed" => Ok(Self::SourceChanged),
            "manual-regeneration" => Ok(Self::ManualRegeneration),
            "superseded-by-edit-conflict" => Ok(Self::SupersededByEditConflict),
            "conflict-accepted" => Ok(Self::ConflictAccepted),
            "human-edit-adopted" => Ok(Self::HumanEditAdopted),
            "removed" => Ok(Self::Removed),
            other => Err(DocError::StoreCorruption(format!(
                "unknown version reason '{}'",
                other
            ))),
        }
    }
}

/// Immutable history snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub document_id: DocumentId,
    /// Per-document sequence number, strictly increasing
    pub seq: i64,
    pub content: String,
    pub content_hash: String,
    pub revision: String,
    pub created_at: DateTime<Utc>,
    pub reason: VersionReason,
    pub run_id: Option<String>,
    pub meta: DocumentMeta,
}

/// A record about to be appended; seq and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub document_id: DocumentId,
    pub content: String,
    pub revision: String,
    pub reason: VersionReason,
    pub run_id: Option<String>,
    pub meta: DocumentMeta,
}

impl NewVersion {
    pub fn content_hash(&self) -> String {
        content_hash(self.content.as_bytes())
    }
}
