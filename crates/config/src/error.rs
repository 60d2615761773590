//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// One of the configuration sources could not be read or deserialized.
    #[display("could not load configuration")]
    Load,
    /// Neither `github.token` nor `GITHUB_TOKEN` is set.
    #[display("no GitHub token configured (set FEEDMAN_GITHUB__TOKEN or GITHUB_TOKEN)")]
    MissingToken,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}
