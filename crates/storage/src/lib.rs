//! Remote record store for feed definitions.
//!
//! Records are UTF-8 text files addressed by a `/`-separated path inside one
//! repository. Every read and write hands back a [`Revision`] which must be
//! supplied again to update or delete the record (optimistic concurrency).

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::{EntryInfo, EntryKind, Record, Revision};
pub use crate::path::{join as join_path, validate as validate_path, validate_collection};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
