//! Writing edited feeds back to the record store.
//!
//! A feed's file name is derived from its name, so renaming a feed moves its
//! record. The store has no rename, so a move is a delete of the old record
//! followed by a create of the new one. Between the two the entry sits in
//! [`PersistState::RenamePending`]; if the create fails the entry stays there
//! and the next [`save`] picks up where the last one stopped.

use crate::error::{ErrorKind, Result, StorageResultExt};
use crate::model::{Feed, storage_key};
use exn::ResultExt;
use feedman_storage::error::ErrorKind as StorageErrorKind;
use feedman_storage::{BackendHandle, Revision, join_path};
use tracing::{debug, info, instrument, warn};

/// What the store holds for an entry, as far as this process knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistState {
    /// Never written, or deleted.
    Unsaved,
    Saved { key: String, revision: Revision },
    /// The record under `from` was deleted as the first half of a rename and
    /// nothing has been written under the new key yet.
    RenamePending { from: String },
}

/// A feed together with its persistence state.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub feed: Feed,
    pub state: PersistState,
}

impl FeedEntry {
    pub fn new(feed: Feed) -> Self {
        Self { feed, state: PersistState::Unsaved }
    }

    pub fn stored(feed: Feed, key: impl Into<String>, revision: Revision) -> Self {
        Self { feed, state: PersistState::Saved { key: key.into(), revision } }
    }

    /// Key of the stored record, if there is one.
    pub fn stored_key(&self) -> Option<&str> {
        match &self.state {
            PersistState::Saved { key, .. } => Some(key),
            PersistState::Unsaved | PersistState::RenamePending { .. } => None,
        }
    }

    /// Key the entry is stored under, or would be stored under if saved now.
    pub fn key(&self) -> String {
        match self.stored_key() {
            Some(key) => key.to_string(),
            None => self.feed.storage_key(),
        }
    }

    pub fn revision(&self) -> Option<&Revision> {
        match &self.state {
            PersistState::Saved { revision, .. } => Some(revision),
            PersistState::Unsaved | PersistState::RenamePending { .. } => None,
        }
    }

    /// `true` when a save would move the record to a different key.
    pub fn is_renamed(&self) -> bool {
        self.stored_key().is_some_and(|key| key != self.feed.normalized().storage_key())
    }
}

/// What a successful [`save`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created { key: String },
    Updated { key: String },
    Renamed { from: String, to: String },
}

impl SaveOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Created { key } | Self::Updated { key } => key,
            Self::Renamed { to, .. } => to,
        }
    }
}

fn record_path(collection: &str, key: &str) -> Result<String> {
    join_path(collection, key).or_store()
}

/// Persist `entry` under the key derived from its name.
///
/// Nothing is sent when validation fails. When the name maps to a new key,
/// the new key is checked first and the save is refused with
/// [`ErrorKind::Conflict`] if another record already lives there. Otherwise
/// the old record is deleted and the new one created. A failed create after
/// that delete is reported as [`ErrorKind::RenamePartial`].
///
/// On success the entry holds the trimmed feed and its new revision. On
/// failure the entry is unchanged, except after a rename's delete, where it
/// is left [`PersistState::RenamePending`].
#[instrument(skip_all, fields(backend = backend.name(), feed = %entry.feed.name))]
pub async fn save(backend: &BackendHandle, collection: &str, entry: &mut FeedEntry) -> Result<SaveOutcome> {
    entry.feed.validate_for_save()?;
    let feed = entry.feed.normalized();
    let key = storage_key(&feed.name);
    let path = record_path(collection, &key)?;

    let (revision, outcome) = match entry.state.clone() {
        PersistState::Unsaved => (None, SaveOutcome::Created { key: key.clone() }),
        PersistState::Saved { key: current, revision } if current == key => {
            (Some(revision), SaveOutcome::Updated { key: key.clone() })
        },
        PersistState::Saved { key: from, revision } => {
            let old_path = record_path(collection, &from)?;
            ensure_vacant(backend, &path).await?;
            let message = format!("Rename feed: {from} -> {key}");
            backend.delete(&old_path, &revision, &message).await.or_store()?;
            info!(from = %from, to = %key, "deleted old record for rename");
            entry.state = PersistState::RenamePending { from: from.clone() };
            (None, SaveOutcome::Renamed { from, to: key.clone() })
        },
        PersistState::RenamePending { from } if from == key => (None, SaveOutcome::Created { key: key.clone() }),
        PersistState::RenamePending { from } => {
            debug!(from = %from, to = %key, "resuming rename");
            (None, SaveOutcome::Renamed { from, to: key.clone() })
        },
    };

    let message = match revision {
        Some(_) => format!("Update feed: {}", feed.name),
        None => format!("Add feed: {}", feed.name),
    };
    let content = feed.to_json()?;
    let written = backend.write(&path, &content, revision.as_ref(), &message).await;
    let revision = match (written, &entry.state) {
        (Ok(revision), _) => revision,
        (Err(err), PersistState::RenamePending { from }) => {
            warn!(from = %from, to = %key, "rename left incomplete");
            let kind = ErrorKind::RenamePartial { from: from.clone(), to: key.clone() };
            return Err(err).or_raise(|| kind);
        },
        (Err(err), _) => return Err(err).or_store(),
    };

    info!(key = %key, revision = %revision, "saved feed");
    entry.feed = feed;
    entry.state = PersistState::Saved { key, revision };
    Ok(outcome)
}

/// Refuse to move a record onto a key that is already taken.
async fn ensure_vacant(backend: &BackendHandle, path: &str) -> Result<()> {
    match backend.read(path).await {
        Ok(_) => exn::bail!(ErrorKind::Conflict(path.to_string())),
        Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => Ok(()),
        Err(err) => Err(err).or_store(),
    }
}

/// Remove the stored record behind `entry`.
///
/// An entry that was never saved cannot be deleted. An entry halfway through
/// a rename has nothing stored, so it is simply marked unsaved.
#[instrument(skip_all, fields(backend = backend.name(), feed = %entry.feed.name))]
pub async fn delete(backend: &BackendHandle, collection: &str, entry: &mut FeedEntry) -> Result<()> {
    match entry.state.clone() {
        PersistState::Unsaved => exn::bail!(ErrorKind::Validation(format!("`{}` has not been saved", entry.feed.name))),
        PersistState::RenamePending { from } => {
            debug!(from = %from, "discarding pending rename");
        },
        PersistState::Saved { key, revision } => {
            let path = record_path(collection, &key)?;
            let message = format!("Delete feed: {}", entry.feed.name);
            backend.delete(&path, &revision, &message).await.or_store()?;
            info!(key = %key, "deleted feed");
        },
    }
    entry.state = PersistState::Unsaved;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedman_storage::StorageBackend;
    use feedman_storage::backend::{MockBackend, Operation};
    use std::sync::Arc;

    const COLLECTION: &str = "feeds";

    fn stored(files: &[(&str, &Feed)]) -> (Arc<MockBackend>, BackendHandle) {
        let files: Vec<_> = files
            .iter()
            .map(|(key, feed)| (format!("{COLLECTION}/{key}"), feed.to_json().unwrap()))
            .collect();
        let mock = Arc::new(MockBackend::with_files(files));
        let handle: BackendHandle = mock.clone();
        (mock, handle)
    }

    fn entry_for(key: &str, feed: &Feed) -> FeedEntry {
        FeedEntry::stored(feed.clone(), key, MockBackend::revision_of(&feed.to_json().unwrap()))
    }

    fn write(path: &str, create: bool, message: &str) -> Operation {
        Operation::Write { path: path.to_string(), create, message: message.to_string() }
    }

    fn delete_op(path: &str, message: &str) -> Operation {
        Operation::Delete { path: path.to_string(), message: message.to_string() }
    }

    #[tokio::test]
    async fn create_new_feed() {
        let (mock, backend) = stored(&[]);
        let mut entry = FeedEntry::new(Feed::named(" 3DMX "));

        let outcome = save(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Created { key: "3dmx.json".to_string() });
        assert_eq!(entry.feed.name, "3DMX");
        assert_eq!(entry.stored_key(), Some("3dmx.json"));
        assert_eq!(mock.mutations().await, vec![write("feeds/3dmx.json", true, "Add feed: 3DMX")]);
        let content = mock.content("feeds/3dmx.json").await.unwrap();
        assert_eq!(entry.revision(), Some(&MockBackend::revision_of(&content)));
    }

    #[tokio::test]
    async fn unchanged_resave_is_byte_identical() {
        let feed = Feed::named("Kytary");
        let (mock, backend) = stored(&[("kytary.json", &feed)]);
        let before = mock.content("feeds/kytary.json").await.unwrap();
        let mut entry = entry_for("kytary.json", &feed);

        let outcome = save(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Updated { key: "kytary.json".to_string() });
        assert_eq!(mock.content("feeds/kytary.json").await.unwrap(), before);
        assert_eq!(mock.mutations().await, vec![write("feeds/kytary.json", false, "Update feed: Kytary")]);
    }

    #[tokio::test]
    async fn rename_deletes_then_creates() {
        let feed = Feed::named("Muziker");
        let (mock, backend) = stored(&[("muziker.json", &feed)]);
        let mut entry = entry_for("muziker.json", &feed);
        entry.feed.name = "Muziker SK".to_string();

        let outcome = save(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Renamed { from: "muziker.json".into(), to: "muziker_sk.json".into() });
        assert_eq!(
            mock.mutations().await,
            vec![
                delete_op("feeds/muziker.json", "Rename feed: muziker.json -> muziker_sk.json"),
                write("feeds/muziker_sk.json", true, "Add feed: Muziker SK"),
            ]
        );
        assert!(mock.content("feeds/muziker.json").await.is_none());
        assert_eq!(entry.stored_key(), Some("muziker_sk.json"));
    }

    #[tokio::test]
    async fn case_only_rename_is_an_update() {
        let feed = Feed::named("Rockster");
        let (mock, backend) = stored(&[("rockster.json", &feed)]);
        let mut entry = entry_for("rockster.json", &feed);
        entry.feed.name = "ROCKSTER".to_string();
        assert!(!entry.is_renamed());

        save(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(mock.mutations().await, vec![write("feeds/rockster.json", false, "Update feed: ROCKSTER")]);
    }

    #[tokio::test]
    async fn rename_onto_existing_record_is_refused() {
        let (a, b) = (Feed::named("A B"), Feed::named("Other"));
        let (mock, backend) = stored(&[("a_b.json", &a), ("other.json", &b)]);
        let mut entry = entry_for("other.json", &b);
        entry.feed.name = "A-B".to_string();

        let err = save(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(path) if path == "feeds/a_b.json"));
        assert!(mock.mutations().await.is_empty());
        assert_eq!(entry.stored_key(), Some("other.json"));
    }

    #[tokio::test]
    async fn creating_over_existing_record_is_refused() {
        let existing = Feed::named("A B");
        let (mock, backend) = stored(&[("a_b.json", &existing)]);
        let before = mock.content("feeds/a_b.json").await;
        let mut entry = FeedEntry::new(Feed::named("A-B"));

        let err = save(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
        assert_eq!(mock.content("feeds/a_b.json").await, before);
        assert_eq!(entry.state, PersistState::Unsaved);
    }

    #[tokio::test]
    async fn stale_revision_leaves_entry_untouched() {
        let feed = Feed::named("PMC");
        let (mock, backend) = stored(&[("pmc.json", &feed)]);
        let mut entry = entry_for("pmc.json", &feed);
        let original = entry.clone();
        // Someone else changes the record in the meantime.
        let current = mock.read("feeds/pmc.json").await.unwrap();
        mock.write("feeds/pmc.json", "{\"name\": \"PMC\"}\n", Some(&current.revision), "Edit").await.unwrap();
        entry.feed.enabled = false;

        let err = save(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
        assert_eq!(entry.state, original.state);
        assert_eq!(entry.revision(), original.revision());
    }

    #[tokio::test]
    async fn failed_probe_stops_rename_before_delete() {
        let feed = Feed::named("Basys");
        let (mock, backend) = stored(&[("basys.json", &feed)]);
        let mut entry = entry_for("basys.json", &feed);
        entry.feed.name = "Basys CZ".to_string();
        mock.fail_on("feeds/basys_cz.json", StorageErrorKind::Network("connection reset".into())).await;

        let err = save(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transient(_)));
        assert!(mock.mutations().await.is_empty());
        assert_eq!(entry.stored_key(), Some("basys.json"));
    }

    #[tokio::test]
    async fn failed_create_after_rename_delete_can_be_resumed() {
        let feed = Feed::named("Basys");
        let (mock, backend) = stored(&[("basys.json", &feed)]);
        let mut entry = entry_for("basys.json", &feed);
        entry.feed.name = "Basys CZ".to_string();
        mock.fail_writes_on("feeds/basys_cz.json", StorageErrorKind::Network("connection reset".into())).await;

        let err = save(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RenamePartial { from, to } if from == "basys.json" && to == "basys_cz.json"));
        assert!(err.is_retryable());
        assert_eq!(entry.state, PersistState::RenamePending { from: "basys.json".to_string() });
        assert!(mock.content("feeds/basys.json").await.is_none());

        mock.clear_failures().await;
        let outcome = save(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Renamed { from: "basys.json".into(), to: "basys_cz.json".into() });
        let renamed = "Rename feed: basys.json -> basys_cz.json";
        assert_eq!(
            mock.mutations().await,
            vec![
                delete_op("feeds/basys.json", renamed),
                write("feeds/basys_cz.json", true, "Add feed: Basys CZ"),
                write("feeds/basys_cz.json", true, "Add feed: Basys CZ"),
            ]
        );
        assert!(mock.content("feeds/basys_cz.json").await.is_some());
    }

    #[tokio::test]
    async fn pending_rename_can_be_discarded() {
        let (mock, backend) = stored(&[]);
        let mut entry =
            FeedEntry { feed: Feed::named("Basys CZ"), state: PersistState::RenamePending { from: "basys.json".into() } };
        delete(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(entry.state, PersistState::Unsaved);
        assert!(mock.journal().await.is_empty());
    }

    #[tokio::test]
    async fn blank_name_sends_nothing() {
        let (mock, backend) = stored(&[]);
        let mut entry = FeedEntry::new(Feed::named("  "));
        let err = save(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        assert!(mock.journal().await.is_empty());
    }

    #[tokio::test]
    async fn delete_saved_feed() {
        let feed = Feed::named("Eprodance");
        let (mock, backend) = stored(&[("eprodance.json", &feed)]);
        let mut entry = entry_for("eprodance.json", &feed);

        delete(&backend, COLLECTION, &mut entry).await.unwrap();
        assert_eq!(entry.state, PersistState::Unsaved);
        assert_eq!(mock.mutations().await, vec![delete_op("feeds/eprodance.json", "Delete feed: Eprodance")]);
    }

    #[tokio::test]
    async fn delete_unsaved_feed_is_rejected() {
        let (mock, backend) = stored(&[]);
        let mut entry = FeedEntry::new(Feed::named("New"));
        let err = delete(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        assert!(mock.journal().await.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_record_is_not_found() {
        let feed = Feed::named("Gone");
        let (_mock, backend) = stored(&[]);
        let mut entry = entry_for("gone.json", &feed);
        let err = delete(&backend, COLLECTION, &mut entry).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert_eq!(entry.stored_key(), Some("gone.json"));
    }
}
