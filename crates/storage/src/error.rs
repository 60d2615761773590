//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Clone, Display, Error, PartialEq, Eq)]
pub enum ErrorKind {
    /// Record or collection does not exist
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Credential missing, invalid, expired or lacking scope
    #[display("access denied: {_0}")]
    AccessDenied(#[error(not(source))] String),
    /// Supplied revision is stale, or a record already exists where one was
    /// to be created
    #[display("revision conflict: {_0}")]
    Conflict(#[error(not(source))] String),
    /// Transport failure, timeout or unexpected server response
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Path contains invalid characters or escapes the repository root
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Payload could not be decoded (bad base64, not UTF-8, unexpected shape)
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing in this crate retries on its own; this is advice for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
