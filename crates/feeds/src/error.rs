//! Feed Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures coming out of the record
//! store or the CSV sampler are re-raised as the matching kind below, keeping
//! the original error as a child frame.

use derive_more::{Display, Error};
use feedman_sample::error::ErrorKind as SampleErrorKind;
use feedman_storage::error::ErrorKind as StorageErrorKind;

/// A feed error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies a feed failure by what the operator can do about it.
///
/// ### Input Errors
/// - [`ErrorKind::Validation`]: nothing was sent to the store.
///
/// ### Store Errors
/// - [`ErrorKind::NotFound`], [`ErrorKind::Conflict`], [`ErrorKind::AccessDenied`],
///   [`ErrorKind::Transient`] and [`ErrorKind::Storage`].
/// - [`ErrorKind::RenamePartial`]: the old record was deleted but the new one
///   was never written. Saving the same entry again finishes the rename.
///
/// ### Content Errors
/// - [`ErrorKind::CorruptRecord`], [`ErrorKind::FetchFailure`] and [`ErrorKind::Source`].
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid feed: {_0}")]
    Validation(#[error(not(source))] String),
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("conflict at {_0}")]
    Conflict(#[error(not(source))] String),
    #[display("access denied: {_0}")]
    AccessDenied(#[error(not(source))] String),
    #[display("temporary failure: {_0}")]
    Transient(#[error(not(source))] String),
    /// The stored record under this key is not a valid feed.
    #[display("corrupt feed record `{_0}`")]
    CorruptRecord(#[error(not(source))] String),
    #[display("could not fetch CSV source {_0}")]
    FetchFailure(#[error(not(source))] String),
    #[display("CSV source could not be parsed")]
    Source,
    #[display("rename incomplete: `{from}` was deleted but `{to}` was not written")]
    RenamePartial { from: String, to: String },
    #[display("storage backend failure")]
    Storage,
}

impl ErrorKind {
    /// Feed-level kind for a record store failure.
    pub fn storage(kind: &StorageErrorKind) -> Self {
        match kind {
            StorageErrorKind::NotFound(path) => Self::NotFound(path.clone()),
            StorageErrorKind::AccessDenied(path) => Self::AccessDenied(path.clone()),
            StorageErrorKind::Conflict(path) => Self::Conflict(path.clone()),
            StorageErrorKind::Network(message) => Self::Transient(message.clone()),
            StorageErrorKind::InvalidPath(_) | StorageErrorKind::InvalidData(_) | StorageErrorKind::BackendError(_) => {
                Self::Storage
            },
        }
    }

    /// Feed-level kind for a CSV sampling failure.
    pub fn sample(kind: &SampleErrorKind) -> Self {
        match kind {
            SampleErrorKind::FetchFailure { url, .. } => Self::FetchFailure(url.clone()),
            SampleErrorKind::Parse | SampleErrorKind::Delimiter(_) | SampleErrorKind::Client => Self::Source,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) | Self::FetchFailure(_) | Self::RenamePartial { .. } => true,
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::Conflict(_)
            | Self::AccessDenied(_)
            | Self::CorruptRecord(_)
            | Self::Source
            | Self::Storage => false,
        }
    }
}

/// Re-raise record store errors as feed errors.
pub(crate) trait StorageResultExt<T> {
    fn or_store(self) -> Result<T>;
}

impl<T> StorageResultExt<T> for feedman_storage::error::Result<T> {
    fn or_store(self) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::storage(&*err);
                Err(err).or_raise(|| kind)
            },
        }
    }
}

/// Re-raise sampler errors as feed errors.
pub(crate) trait SampleResultExt<T> {
    fn or_sample(self) -> Result<T>;
}

impl<T> SampleResultExt<T> for feedman_sample::error::Result<T> {
    fn or_sample(self) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::sample(&*err);
                Err(err).or_raise(|| kind)
            },
        }
    }
}
