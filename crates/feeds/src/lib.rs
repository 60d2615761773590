//! Supplier feed definitions kept as JSON records in a remote store.
//!
//! A [`Feed`] says where a supplier's stock CSV lives, how to read it, and
//! how its rows match shop products. This crate loads feeds from a
//! collection ([`collection`]), writes edits back including renames
//! ([`sync`]), and lines CSV headers up with a feed's columns ([`mapping`]).

pub mod collection;
pub mod error;
pub mod mapping;
pub mod model;
pub mod sync;

pub use crate::collection::{Collection, CsvSource, LoadEvent, discover_sources, load, load_stream};
pub use crate::mapping::{Preview, annotate, preview, suggest_mappings};
pub use crate::model::{Columns, Delimiter, Feed, MatchStrategy, Role, storage_key};
pub use crate::sync::{FeedEntry, PersistState, SaveOutcome, delete, save};

/// Maximum number of records read at once while loading a collection.
pub const MAX_LOAD_CONCURRENCY: usize = 8;
