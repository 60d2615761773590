//! In-memory storage backend for testing.

use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{EntryInfo, EntryKind, Record, Revision};
use crate::path::{validate as validate_path, validate_collection};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// A call made against a [`MockBackend`], in the order it was received.
///
/// Calls are journalled before they are checked, so rejected writes and
/// deletes appear in the journal too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    List(String),
    Read(String),
    /// `create` is `true` when no revision was supplied.
    Write { path: String, create: bool, message: String },
    Delete { path: String, message: String },
}

/// In-memory storage backend for testing.
///
/// Records are stored in a `BTreeMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. The
/// revision of a record is the BLAKE3 hash of its content, and the same
/// create/update/delete conflict rules as the real store are enforced.
///
/// # Examples
///
/// ```
/// use feedman_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockBackend::with_files([
///     ("feeds/3dmx.json", "{\"name\": \"3DMX\"}\n"),
/// ]);
/// let record = backend.read("feeds/3dmx.json").await.unwrap();
/// backend.write("feeds/3dmx.json", "{}\n", Some(&record.revision), "Update").await.unwrap();
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<String, String>>,
    failures: RwLock<HashMap<String, ErrorKind>>,
    write_failures: RwLock<HashMap<String, ErrorKind>>,
    journal: RwLock<Vec<Operation>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with records.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        let mut map = BTreeMap::new();
        for (path, content) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {path}");
            };
            map.insert(validated, content.into());
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            failures: RwLock::new(HashMap::new()),
            write_failures: RwLock::new(HashMap::new()),
            journal: RwLock::new(Vec::new()),
        }
    }

    /// Revision the mock assigns to `content`.
    pub fn revision_of(content: &str) -> Revision {
        Revision::new(blake3::hash(content.as_bytes()).to_hex().to_string())
    }

    /// Make every subsequent call touching `path` fail with `kind` until
    /// [`clear_failures()`](Self::clear_failures) is called.
    pub async fn fail_on(&self, path: impl Into<String>, kind: ErrorKind) {
        self.failures.write().await.insert(path.into(), kind);
    }

    /// Like [`fail_on()`](Self::fail_on), but only writes to `path` fail.
    pub async fn fail_writes_on(&self, path: impl Into<String>, kind: ErrorKind) {
        self.write_failures.write().await.insert(path.into(), kind);
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
        self.write_failures.write().await.clear();
    }

    /// Every call received so far.
    pub async fn journal(&self) -> Vec<Operation> {
        self.journal.read().await.clone()
    }

    /// Only the calls that would have changed state.
    pub async fn mutations(&self) -> Vec<Operation> {
        self.journal
            .read()
            .await
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. } | Operation::Delete { .. }))
            .cloned()
            .collect()
    }

    /// Raw stored content, bypassing the journal.
    pub async fn content(&self, path: &str) -> Option<String> {
        self.storage.read().await.get(path).cloned()
    }

    async fn record(&self, operation: Operation) {
        self.journal.write().await.push(operation);
    }

    async fn injected(&self, path: &str) -> Result<()> {
        match self.failures.read().await.get(path) {
            Some(kind) => exn::bail!(kind.clone()),
            None => Ok(()),
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn identity(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    async fn list(&self, collection: &str) -> Result<Vec<EntryInfo>> {
        let collection = validate_collection(collection)?;
        self.record(Operation::List(collection.clone())).await;
        self.injected(&collection).await?;

        let prefix = match collection.is_empty() {
            true => String::new(),
            false => format!("{collection}/"),
        };
        let guard = self.storage.read().await;
        let mut entries: Vec<EntryInfo> = Vec::new();
        let mut found = false;
        for (path, content) in guard.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else { break };
            found = true;
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if !entries.iter().any(|e| e.name == dir && e.kind == EntryKind::Directory) {
                        entries.push(EntryInfo {
                            name: dir.to_string(),
                            path: format!("{prefix}{dir}"),
                            size: 0,
                            download_url: None,
                            kind: EntryKind::Directory,
                        });
                    }
                },
                None => entries.push(EntryInfo {
                    name: rest.to_string(),
                    path: path.clone(),
                    size: content.len() as u64,
                    download_url: Some(format!("mock://{}/{path}", self.name)),
                    kind: EntryKind::File,
                }),
            }
        }
        // Mirror the real store: listing a collection that holds nothing is
        // indistinguishable from listing one that was never created.
        if !found && !collection.is_empty() {
            exn::bail!(ErrorKind::NotFound(collection));
        }
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Record> {
        let path = validate_path(path)?;
        self.record(Operation::Read(path.clone())).await;
        self.injected(&path).await?;
        let content = self.storage.read().await.get(&path).cloned().ok_or_else(|| ErrorKind::NotFound(path))?;
        let revision = Self::revision_of(&content);
        Ok(Record { content, revision })
    }

    async fn write(&self, path: &str, content: &str, revision: Option<&Revision>, message: &str) -> Result<Revision> {
        let path = validate_path(path)?;
        self.record(Operation::Write {
            path: path.clone(),
            create: revision.is_none(),
            message: message.to_string(),
        })
        .await;
        self.injected(&path).await?;
        if let Some(kind) = self.write_failures.read().await.get(&path) {
            exn::bail!(kind.clone());
        }
        let mut guard = self.storage.write().await;
        let current = guard.get(&path).map(|c| Self::revision_of(c));
        match (revision, current) {
            (None, None) => {},
            (Some(expected), Some(current)) if *expected == current => {},
            _ => exn::bail!(ErrorKind::Conflict(path)),
        }
        guard.insert(path, content.to_string());
        Ok(Self::revision_of(content))
    }

    async fn delete(&self, path: &str, revision: &Revision, message: &str) -> Result<()> {
        let path = validate_path(path)?;
        self.record(Operation::Delete {
            path: path.clone(),
            message: message.to_string(),
        })
        .await;
        self.injected(&path).await?;
        let mut guard = self.storage.write().await;
        let current = guard.get(&path).map(|c| Self::revision_of(c)).ok_or_else(|| ErrorKind::NotFound(path.clone()))?;
        if current != *revision {
            exn::bail!(ErrorKind::Conflict(path));
        }
        guard.remove(&path);
        Ok(())
    }
}
