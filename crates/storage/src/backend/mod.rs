//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface over a remote, revisioned record store. The production backend
//! talks to the GitHub contents API; an in-memory backend is available behind
//! the `mock` feature for tests.

mod github;
#[cfg(feature = "mock")]
mod mock;

pub use self::github::{DEFAULT_API_BASE, DEFAULT_TIMEOUT, GithubBackend};
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
use crate::error::Result;
use crate::models::{EntryInfo, Record, Revision};
use async_trait::async_trait;

/// Unified interface for revisioned record stores.
///
/// Every operation is a single network round-trip. Nothing retries
/// automatically: a failure is final for that call and is handed back to the
/// caller as-is.
///
/// # Revisions
/// [`read()`](Self::read) and [`write()`](Self::write) return the record's
/// current [`Revision`]. Updates and deletes must present the revision they
/// were based on; a mismatch fails with
/// [`Conflict`](crate::error::ErrorKind::Conflict).
///
/// # Examples
///
/// ```no_run
/// use feedman_storage::{backend::StorageBackend, error::Result};
///
/// async fn bump(backend: &dyn StorageBackend) -> Result<()> {
///     let record = backend.read("feeds/counter.json").await?;
///     let next = format!("{}\n", record.content.trim().parse::<u64>().unwrap_or(0) + 1);
///     backend.write("feeds/counter.json", &next, Some(&record.revision), "Bump counter").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Identify the account the backend is authenticated as.
    ///
    /// Used purely for display; a failure here says nothing about whether
    /// individual records are accessible.
    async fn identity(&self) -> Result<String>;

    /// List the direct children of a collection. The empty string lists the
    /// repository root.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// collection does not exist.
    async fn list(&self, collection: &str) -> Result<Vec<EntryInfo>>;

    /// Read a record's decoded content and current revision.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the record
    /// does not exist.
    async fn read(&self, path: &str) -> Result<Record>;

    /// Create or update a record, returning its new revision.
    ///
    /// With `revision` absent the record must not exist yet; with `revision`
    /// present it must match the stored one. Either violation is a
    /// [`Conflict`](crate::error::ErrorKind::Conflict).
    async fn write(&self, path: &str, content: &str, revision: Option<&Revision>, message: &str) -> Result<Revision>;

    /// Delete a record at the given revision.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the record
    /// does not exist and [`Conflict`](crate::error::ErrorKind::Conflict) if
    /// the revision is stale.
    async fn delete(&self, path: &str, revision: &Revision, message: &str) -> Result<()>;
}
