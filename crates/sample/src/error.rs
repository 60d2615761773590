//! Sampler Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A sampling error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sampling operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The CSV resource could not be retrieved. `status` is absent when no
    /// response arrived at all (DNS, connection refused, timeout).
    #[display("failed to fetch CSV from {url}")]
    FetchFailure { url: String, status: Option<u16> },
    /// The fetched text is not parseable as delimited text.
    #[display("malformed CSV")]
    Parse,
    /// Unknown delimiter name.
    #[display("unsupported delimiter: {_0:?}")]
    Delimiter(#[error(not(source))] String),
    #[display("could not construct HTTP client")]
    Client,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FetchFailure { status: None, .. } => true,
            Self::FetchFailure { status: Some(status), .. } => *status >= 500 || *status == 429,
            Self::Parse | Self::Delimiter(_) | Self::Client => false,
        }
    }
}
