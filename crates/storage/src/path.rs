//! Path validation for repository paths.
//!
//! Repository paths are always `/`-separated, regardless of platform, so
//! validation works on strings rather than [`std::path::Path`].

use crate::error::{ErrorKind, Result};

/// Validates a record path for security and correctness.
/// Ensures that paths don't escape the repository root (no `..` traversal).
///
/// > **Note:** Backslashes are rejected outright; they are legal in Git but
/// >           are never produced by this crate and almost always a mistake.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use feedman_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("feeds/3dmx.json").is_ok());
/// assert!(validate_path("a/../file.csv").is_ok()); // (never leaves repository root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(validate_path("wrong/../feeds/./x.json/").unwrap(), "feeds/x.json");
/// ```
pub fn validate(path: impl AsRef<str>) -> Result<String> {
    let normalized = normalize(path.as_ref())?;
    if normalized.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_string()));
    }
    Ok(normalized)
}

/// Validates a collection path. Unlike [`validate`], an empty result is
/// allowed and means the repository root.
pub fn validate_collection(path: impl AsRef<str>) -> Result<String> {
    normalize(path.as_ref())
}

/// Joins a collection and a record name into a validated record path.
///
/// ```
/// use feedman_storage::join_path;
/// assert_eq!(join_path("feeds", "a.json").unwrap(), "feeds/a.json");
/// assert_eq!(join_path("", "root.csv").unwrap(), "root.csv");
/// assert!(join_path("feeds", "../escape.json").is_err());
/// ```
pub fn join(collection: impl AsRef<str>, name: impl AsRef<str>) -> Result<String> {
    let collection = validate_collection(collection)?;
    let name = name.as_ref();
    if name.contains('/') || matches!(name, "" | "." | "..") {
        exn::bail!(ErrorKind::InvalidPath(name.to_string()));
    }
    match collection.is_empty() {
        true => validate(name),
        false => validate(format!("{collection}/{name}")),
    }
}

fn normalize(path: &str) -> Result<String> {
    let invalid = || ErrorKind::InvalidPath(path.to_string());
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {},
            ".." => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
            // Null bytes cause truncation further down the line; backslashes
            // are a Windows path that slipped through.
            s if s.contains('\0') || s.contains('\\') => exn::bail!(invalid()),
            s => components.push(s),
        }
    }
    Ok(components.join("/"))
}
