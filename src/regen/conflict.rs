//! Conflict Resolver
//!
//! Compares the document on disk with the last machine-written hash in the
//! registry. Human edits are never overwritten: the proposed content goes to
//! history as a superseded record and the conflict is reported.

use std::path::Path;

use serde::Serialize;

use crate::types::{Document, DocumentId, Result, content_hash};

/// Commit-time state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum Verdict {
    /// On-disk content matches the last machine write; overwrite permitted
    Clean,
    /// On-disk content diverges; overwrite refused
    Edited { live_hash: String },
    /// No registry entry, or the file is gone; treated as first generation
    Missing,
}

impl Verdict {
    pub fn permits_write(&self) -> bool {
        !matches!(self, Self::Edited { .. })
    }
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Verdict from the registry entry and the bytes currently on disk.
    pub fn verdict(registered: Option<&Document>, on_disk: Option<&[u8]>) -> Verdict {
        let (Some(doc), Some(bytes)) = (registered, on_disk) else {
            return Verdict::Missing;
        };
        let live_hash = content_hash(bytes);
        if live_hash == doc.content_hash {
            Verdict::Clean
        } else {
            Verdict::Edited { live_hash }
        }
    }

    /// Read a document file; absence is not an error.
    pub fn read_live(path: &Path) -> Result<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verdict for a document whose file lives at `path`.
    pub fn inspect(registered: Option<&Document>, path: &Path) -> Result<Verdict> {
        if registered.is_none() {
            return Ok(Verdict::Missing);
        }
        let on_disk = Self::read_live(path)?;
        Ok(Self::verdict(registered, on_disk.as_deref()))
    }
}

/// One conflict surfaced to the operator at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub document_id: DocumentId,
    /// Last machine-written hash from the registry
    pub expected_hash: String,
    /// Hash of the human-edited file on disk
    pub live_hash: String,
    /// Sequence number of the superseded record holding the proposed content
    pub superseded_seq: i64,
}
