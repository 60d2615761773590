//! Loading every feed in a collection, and finding CSV files to feed from.

use crate::MAX_LOAD_CONCURRENCY;
use crate::error::{Error, ErrorKind, Result, StorageResultExt};
use crate::model::{Feed, storage_key};
use crate::sync::FeedEntry;
use async_stream::stream;
use feedman_storage::error::ErrorKind as StorageErrorKind;
use feedman_storage::{BackendHandle, EntryInfo};
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::cmp::Ordering;
use std::pin::pin;
use tracing::{debug, warn};

const RECORD_SUFFIX: &str = ".json";
const SOURCE_SUFFIX: &str = ".csv";

/// Progress events emitted by [`load_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete): exactly once, with the
///    number of records about to be read.
/// 3. [`Loaded`](Self::Loaded): zero or more times, one per readable record.
/// 4. [`Complete`](Self::Complete): exactly once.
///
/// A failure to list the collection ends the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum LoadEvent {
    Started,
    DiscoveryComplete(u64),
    Loaded(FeedEntry),
    Complete,
}

/// Streams [`LoadEvent`]s for every `.json` record in `collection`.
///
/// Records are read concurrently, up to `MAX_LOAD_CONCURRENCY` at a time, and
/// arrive in completion order. A record that cannot be read or parsed is
/// surfaced as an `Err` item without ending the stream. A collection that
/// does not exist yet is treated as empty.
pub fn load_stream<'a>(backend: &'a BackendHandle, collection: &'a str) -> impl Stream<Item = Result<LoadEvent>> + 'a {
    stream!({
        yield Ok(LoadEvent::Started);

        let entries = match backend.list(collection).await {
            Ok(entries) => entries,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                debug!(collection, "collection does not exist yet");
                Vec::new()
            },
            Err(err) => {
                yield Err::<LoadEvent, _>(err).or_store();
                return;
            },
        };
        let records: Vec<EntryInfo> =
            entries.into_iter().filter(|entry| entry.is_file() && entry.name.ends_with(RECORD_SUFFIX)).collect();
        yield Ok(LoadEvent::DiscoveryComplete(u64::try_from(records.len()).unwrap_or(u64::MAX)));

        let mut futures: Vec<_> = records.into_iter().map(|record| load_entry(backend, record)).collect();
        let mut loading = FuturesUnordered::new();
        loading.extend(futures.drain(..MAX_LOAD_CONCURRENCY.min(futures.len())));
        while let Some(result) = loading.next().await {
            yield result.map(LoadEvent::Loaded);
            if !futures.is_empty() {
                loading.push(futures.remove(0));
            }
        }

        yield Ok(LoadEvent::Complete);
    })
}

async fn load_entry(backend: &BackendHandle, record: EntryInfo) -> Result<FeedEntry> {
    let stored = backend.read(&record.path).await.or_store()?;
    let feed = Feed::from_json(&record.name, &stored.content)?;
    debug!(key = %record.name, "loaded feed");
    Ok(FeedEntry::stored(feed, record.name, stored.revision))
}

/// Display order: case-insensitive name, then exact name, then storage key.
pub fn compare_entries(a: &FeedEntry, b: &FeedEntry) -> Ordering {
    a.feed
        .name
        .to_lowercase()
        .cmp(&b.feed.name.to_lowercase())
        .then_with(|| a.feed.name.cmp(&b.feed.name))
        .then_with(|| a.key().cmp(&b.key()))
}

/// Every feed that loaded, plus every record that did not.
#[derive(Debug, Default)]
pub struct Collection {
    /// Sorted by [`compare_entries`].
    pub feeds: Vec<FeedEntry>,
    pub failures: Vec<Error>,
}

impl Collection {
    /// Find a feed by storage key (with or without `.json`) or by name.
    ///
    /// Names are compared case-insensitively, and a query that derives the
    /// same storage key as a feed matches it too.
    pub fn find(&self, query: &str) -> Option<&FeedEntry> {
        self.position(query).map(|index| &self.feeds[index])
    }

    fn position(&self, query: &str) -> Option<usize> {
        let query = query.trim();
        let with_suffix = format!("{query}{RECORD_SUFFIX}");
        let derived = storage_key(query);
        let lower = query.to_lowercase();
        self.feeds
            .iter()
            .position(|entry| {
                let key = entry.key();
                key == query || key == with_suffix
            })
            .or_else(|| self.feeds.iter().position(|entry| entry.feed.name.to_lowercase() == lower))
            .or_else(|| self.feeds.iter().position(|entry| entry.key() == derived))
    }
}

/// Load and sort every feed in `collection`.
///
/// Only a failure to list the collection is an error. Records that fail to
/// load are collected in [`Collection::failures`].
pub async fn load(backend: &BackendHandle, collection: &str) -> Result<Collection> {
    let mut loaded = Collection::default();
    let mut complete = false;
    let mut events = pin!(load_stream(backend, collection));
    while let Some(event) = events.next().await {
        match event {
            Ok(LoadEvent::Loaded(entry)) => loaded.feeds.push(entry),
            Ok(LoadEvent::Complete) => complete = true,
            Ok(LoadEvent::Started | LoadEvent::DiscoveryComplete(_)) => {},
            Err(err) => {
                warn!(error = %*err, "feed record failed to load");
                loaded.failures.push(err);
            },
        }
    }
    if !complete {
        // The stream only ends early right after yielding the listing failure.
        match loaded.failures.pop() {
            Some(err) => return Err(err),
            None => exn::bail!(ErrorKind::Storage),
        }
    }
    loaded.feeds.sort_by(compare_entries);
    Ok(loaded)
}

/// A CSV file in the repository that a feed can point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSource {
    pub name: String,
    pub url: Option<String>,
    pub size: u64,
}

impl CsvSource {
    pub fn display_size(&self) -> String {
        format_size(self.size)
    }
}

/// Human-readable byte count with one decimal for KB and MB.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{:.1} MB", b as f64 / MB as f64),
    }
}

/// CSV files directly under `path`, sorted by name.
///
/// Listing failures are logged and produce an empty list; sources are only
/// ever a convenience when picking a feed's URL.
pub async fn discover_sources(backend: &BackendHandle, path: &str) -> Vec<CsvSource> {
    let entries = match backend.list(path).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path, error = %*err, "could not list CSV sources");
            return Vec::new();
        },
    };
    let mut sources: Vec<CsvSource> = entries
        .into_iter()
        .filter(|entry| entry.is_file() && entry.name.ends_with(SOURCE_SUFFIX))
        .map(|entry| CsvSource { name: entry.name, url: entry.download_url, size: entry.size })
        .collect();
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::PersistState;
    use feedman_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;

    fn record(name: &str) -> String {
        Feed::named(name).to_json().unwrap()
    }

    fn backend(files: Vec<(&str, String)>) -> (Arc<MockBackend>, BackendHandle) {
        let mock = Arc::new(MockBackend::with_files(files));
        let handle: BackendHandle = mock.clone();
        (mock, handle)
    }

    #[tokio::test]
    async fn corrupt_record_is_reported_and_the_rest_load() {
        let (_mock, backend) = backend(vec![
            ("feeds/a.json", record("A")),
            ("feeds/broken.json", "{\"name\": ".to_string()),
            ("feeds/c.json", record("c")),
            ("feeds/readme.md", "not a feed".to_string()),
        ]);
        let collection = load(&backend, "feeds").await.unwrap();
        let names: Vec<_> = collection.feeds.iter().map(|e| e.feed.name.as_str()).collect();
        assert_eq!(names, vec!["A", "c"]);
        assert_eq!(collection.failures.len(), 1);
        assert!(matches!(&*collection.failures[0], ErrorKind::CorruptRecord(key) if key == "broken.json"));
    }

    #[tokio::test]
    async fn loaded_entries_carry_key_and_revision() {
        let content = record("3DMX");
        let (_mock, backend) = backend(vec![("feeds/3dmx.json", content.clone())]);
        let collection = load(&backend, "feeds").await.unwrap();
        assert_eq!(
            collection.feeds[0].state,
            PersistState::Saved { key: "3dmx.json".to_string(), revision: MockBackend::revision_of(&content) }
        );
    }

    #[tokio::test]
    async fn missing_collection_is_empty() {
        let (_mock, backend) = backend(vec![("3dmx_sklad.csv", String::new())]);
        let collection = load(&backend, "feeds").await.unwrap();
        assert!(collection.feeds.is_empty());
        assert!(collection.failures.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let (mock, backend) = backend(vec![("feeds/a.json", record("A"))]);
        mock.fail_on("feeds", StorageErrorKind::AccessDenied("feeds".into())).await;
        let err = load(&backend, "feeds").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AccessDenied(_)));
    }

    #[tokio::test]
    async fn unreadable_record_does_not_stop_the_stream() {
        let (mock, backend) = backend(vec![("feeds/a.json", record("A")), ("feeds/b.json", record("B"))]);
        mock.fail_on("feeds/a.json", StorageErrorKind::Network("timed out".into())).await;

        let events: Vec<_> = load_stream(&backend, "feeds").collect().await;
        assert!(matches!(events.first(), Some(Ok(LoadEvent::Started))));
        assert!(matches!(events.get(1), Some(Ok(LoadEvent::DiscoveryComplete(2)))));
        assert!(matches!(events.last(), Some(Ok(LoadEvent::Complete))));
        let failures: Vec<_> = events.iter().filter_map(|event| event.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].is_retryable());
    }

    #[tokio::test]
    async fn more_records_than_concurrency_limit() {
        let files: Vec<_> = (0..MAX_LOAD_CONCURRENCY * 2 + 1)
            .map(|i| (format!("feeds/feed_{i:02}.json"), record(&format!("Feed {i:02}"))))
            .collect();
        let mock = Arc::new(MockBackend::with_files(files));
        let backend: BackendHandle = mock;
        let collection = load(&backend, "feeds").await.unwrap();
        assert_eq!(collection.feeds.len(), MAX_LOAD_CONCURRENCY * 2 + 1);
        assert_eq!(collection.feeds[0].feed.name, "Feed 00");
    }

    fn entry(name: &str, key: &str) -> FeedEntry {
        FeedEntry::stored(Feed::named(name), key, MockBackend::revision_of(name))
    }

    #[test]
    fn sort_order_is_case_insensitive_then_exact() {
        let mut entries = vec![
            entry("b", "b.json"),
            entry("A", "a.json"),
            entry("c", "c.json"),
            entry("a", "a_2.json"),
            entry("_Zeta", "_zeta.json"),
            entry("Ben's Shop!!", "ben_s_shop__.json"),
            entry("ben", "ben.json"),
            entry("3DMX", "3dmx.json"),
        ];
        entries.sort_by(compare_entries);
        let names: Vec<_> = entries.iter().map(|e| e.feed.name.as_str()).collect();
        assert_eq!(names, vec!["3DMX", "_Zeta", "A", "a", "b", "ben", "Ben's Shop!!", "c"]);
    }

    #[test]
    fn sort_order_falls_back_to_key() {
        let mut entries = vec![entry("Same", "z.json"), entry("Same", "a.json")];
        entries.sort_by(compare_entries);
        let keys: Vec<_> = entries.iter().map(FeedEntry::key).collect();
        assert_eq!(keys, vec!["a.json", "z.json"]);
    }

    #[rstest]
    #[case("3dmx.json", Some("3DMX"))]
    #[case("3dmx", Some("3DMX"))]
    #[case("3dmx ", Some("3DMX"))]
    #[case("muziker sk", Some("Muziker SK"))]
    #[case("Muziker-SK", Some("Muziker SK"))]
    #[case("kytary", None)]
    fn find_by_key_or_name(#[case] query: &str, #[case] expected: Option<&str>) {
        let collection = Collection {
            feeds: vec![entry("3DMX", "3dmx.json"), entry("Muziker SK", "muziker_sk.json")],
            failures: Vec::new(),
        };
        assert_eq!(collection.find(query).map(|e| e.feed.name.as_str()), expected);
    }

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.0 KB")]
    #[case(15_360, "15.0 KB")]
    #[case(1_572_864, "1.5 MB")]
    fn sizes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }

    #[tokio::test]
    async fn sources_are_csv_files_sorted_by_name() {
        let (_mock, backend) = backend(vec![
            ("musictrade_sklad.csv", "x".repeat(2048)),
            ("3dmx_sklad.csv", "SKU;Pocet_ks\n".to_string()),
            ("README.md", String::new()),
            ("feeds/3dmx.json", record("3DMX")),
            ("stock.CSV", String::new()),
        ]);
        let sources = discover_sources(&backend, "").await;
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["3dmx_sklad.csv", "musictrade_sklad.csv"]);
        assert_eq!(sources[0].size, 13);
        assert_eq!(sources[1].display_size(), "2.0 KB");
        assert!(sources[0].url.is_some());
    }

    #[tokio::test]
    async fn source_listing_failure_yields_nothing() {
        let (_mock, backend) = backend(vec![("3dmx_sklad.csv", String::new())]);
        assert!(discover_sources(&backend, "missing").await.is_empty());
    }
}
