//! Storage models.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Opaque version identifier of a stored record.
///
/// For the GitHub backend this is the blob SHA. It must be handed back
/// unchanged when updating or deleting the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);
impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Whether a listed entry is a record or a nested collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Submodules, symlinks and anything else the backend reports.
    Other,
}

/// Entry metadata returned by [`list()`](crate::StorageBackend::list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Final path component
    pub name: String,
    /// Full path from the repository root
    pub path: String,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Direct download location of the raw content, when the backend has one
    pub download_url: Option<String>,
    pub kind: EntryKind,
}
impl EntryInfo {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A record's decoded content together with its current revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub content: String,
    pub revision: Revision,
}
