pub mod document;
pub mod error;
pub mod utils;

pub use document::{
    Document, DocumentId, DocumentMeta, NewVersion, VersionReason, VersionRecord, content_hash,
    slugify, validate_collection,
};
pub use error::{DocError, ErrorCategory, ErrorClassifier, LlmError, Result, ResultExt};
pub use utils::{
    format_timestamp, json_string, json_string_array, json_string_or, log_filter_error,
    log_filter_warn, parse_timestamp, truncate_chars,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

/// Type-safe wrapper for run IDs
///
/// Every orchestrator run gets one; it owns commit locks and tags version records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
