//! Command Error Types

use derive_more::{Display, Error};

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command execution.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("repository request failed")]
    Storage,
    #[display("feed operation failed")]
    Feeds,
    #[display("no feed matches `{_0}`")]
    UnknownFeed(#[error(not(source))] String),
    #[display("--apply needs a feed to save the mapping to")]
    NothingToApply,
    #[display("could not read confirmation from the terminal")]
    Terminal,
}
