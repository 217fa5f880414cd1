//! Local CRUD store.
//!
//! A [`LocalStore`] keeps one collection of records as a JSON array under
//! the record type's storage key. Every mutation reads the whole array,
//! changes it and writes the whole array back.
use std::{marker::PhantomData, sync::Arc};

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    ids::{next_update_time, Clock, IdGenerator, SystemClock},
    KeyValueStore, Note, Record, Result, Snippet,
};

/// Notes, newest first.
pub type NoteStore = LocalStore<Note>;
/// Snippets, newest first.
pub type SnippetStore = LocalStore<Snippet>;

/// Durable list storage for one record type.
pub struct LocalStore<R: Record> {
    port: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> LocalStore<R> {
    /// Creates a store backed by `port`, stamping records with the wall clock.
    pub fn new(port: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(port, Arc::new(SystemClock))
    }

    pub fn with_clock(port: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            port,
            clock,
            ids: IdGenerator::new(),
            _record: PhantomData,
        }
    }

    /// Returns every readable record in stored order.
    ///
    /// A missing key, an unreadable store or a value that is not a JSON
    /// array all read as an empty collection. Entries that do not decode as
    /// a record are left out.
    pub fn list_all(&self) -> Vec<R> {
        self.load()
            .into_iter()
            .filter_map(|entry| match entry {
                Stored::Record(record) => Some(record),
                Stored::Unreadable(_) => None,
            })
            .collect()
    }

    /// Point lookup by id.
    pub fn get(&self, id: &str) -> Option<R> {
        self.list_all().into_iter().find(|r| r.id() == id)
    }

    /// Creates a record and puts it at the front of the collection.
    pub fn create(&self, draft: R::Draft) -> Result<R> {
        let mut entries = self.load();
        self.ids.observe(entries.iter().filter_map(Stored::id));

        let now = self.clock.now();
        let record = R::from_draft(self.ids.next_id(now), now, draft);
        entries.insert(0, Stored::Record(record.clone()));

        self.persist(&entries)?;
        info!("Created {} in {}", record.id(), R::STORAGE_KEY);
        Ok(record)
    }

    /// Merges `patch` into the record with `id`.
    ///
    /// Returns `Ok(None)` without writing anything when no such record exists.
    pub fn update(&self, id: &str, patch: R::Patch) -> Result<Option<R>> {
        let mut entries = self.load();
        let Some(record) = entries.iter_mut().find_map(|entry| match entry {
            Stored::Record(record) if record.id() == id => Some(record),
            _ => None,
        }) else {
            debug!("Cannot update {} in {}: not found", id, R::STORAGE_KEY);
            return Ok(None);
        };

        record.apply_patch(patch);
        let updated_at =
            next_update_time(self.clock.now(), record.updated_at()).max(record.created_at());
        record.set_updated_at(updated_at);
        let updated = record.clone();

        self.persist(&entries)?;
        info!("Updated {} in {}", id, R::STORAGE_KEY);
        Ok(Some(updated))
    }

    /// Removes the record with `id`, returning whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|entry| !matches!(entry, Stored::Record(r) if r.id() == id));

        if entries.len() == before {
            debug!("Nothing to delete for {} in {}", id, R::STORAGE_KEY);
            return Ok(false);
        }

        self.persist(&entries)?;
        info!("Deleted {} from {}", id, R::STORAGE_KEY);
        Ok(true)
    }

    /// Records carrying `tag`, compared case-insensitively.
    pub fn with_tag(&self, tag: &str) -> Vec<R> {
        let search_tag = tag.trim().to_lowercase();
        self.list_all()
            .into_iter()
            .filter(|r| {
                r.tags()
                    .iter()
                    .any(|t| t.trim().to_lowercase() == search_tag)
            })
            .collect()
    }

    /// Fuzzy search over title and body, best match first.
    ///
    /// Title matches weigh twice as much as body matches.
    pub fn search(&self, query: &str) -> Vec<R> {
        let matcher = SkimMatcherV2::default();

        let mut scored: Vec<(i64, R)> = self
            .list_all()
            .into_iter()
            .filter_map(|record| {
                let title_score = matcher.fuzzy_match(record.title(), query).unwrap_or(0);
                let body_score = matcher
                    .fuzzy_match(&record.search_text(), query)
                    .unwrap_or(0);
                let score = title_score * 2 + body_score;
                (score > 0).then_some((score, record))
            })
            .collect();

        // stable, so equal scores keep collection order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!("Search '{}' matched {} records", query, scored.len());
        scored.into_iter().map(|(_, record)| record).collect()
    }

    /// Reads the stored array, decoding each entry on its own.
    fn load(&self) -> Vec<Stored<R>> {
        let raw = match self.port.get(R::STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!("No value stored under {}", R::STORAGE_KEY);
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to read {}: {}", R::STORAGE_KEY, e);
                return Vec::new();
            }
        };

        let values = match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    "Stored value under {} is not a JSON array, treating as empty: {}",
                    R::STORAGE_KEY,
                    e
                );
                return Vec::new();
            }
        };

        let entries: Vec<Stored<R>> = values
            .into_iter()
            .map(|value| match serde_json::from_value::<R>(value.clone()) {
                Ok(record) => Stored::Record(record),
                Err(e) => {
                    warn!(
                        "Keeping unreadable entry in {} as stored: {}",
                        R::STORAGE_KEY,
                        e
                    );
                    Stored::Unreadable(value)
                }
            })
            .collect();
        debug!("Loaded {} entries from {}", entries.len(), R::STORAGE_KEY);
        entries
    }

    fn persist(&self, entries: &[Stored<R>]) -> Result<()> {
        let json = serde_json::to_string(entries)?;
        self.port.set(R::STORAGE_KEY, &json).map_err(|e| {
            error!("Failed to persist {}: {}", R::STORAGE_KEY, e);
            e
        })
    }
}

/// One entry of the stored array.
///
/// Entries that do not decode are written back verbatim so a save never
/// drops data this build cannot read.
#[derive(Serialize)]
#[serde(untagged)]
enum Stored<R> {
    Record(R),
    Unreadable(Value),
}

impl<R: Record> Stored<R> {
    fn id(&self) -> Option<&str> {
        match self {
            Stored::Record(record) => Some(record.id()),
            Stored::Unreadable(value) => value.get("id").and_then(Value::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ids::ManualClock, DevkitError, MemoryStore, NoteDraft, NotePatch, SnippetDraft,
        NOTES_KEY, SNIPPETS_KEY,
    };
    use chrono::{TimeZone, Utc};

    fn setup() -> (Arc<MemoryStore>, ManualClock, NoteStore) {
        let port = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let store = NoteStore::with_clock(port.clone(), Arc::new(clock.clone()));
        (port, clock, store)
    }

    #[test]
    fn create_then_get_returns_same_record() {
        let (_, _, store) = setup();
        let created = store.create(NoteDraft::new("a", "<p>x</p>")).unwrap();
        assert_eq!(store.get(&created.id), Some(created.clone()));
        assert_eq!(created.created_at, created.updated_at);
    }

    #[test]
    fn creates_are_listed_newest_first() {
        let (_, clock, store) = setup();
        let mut ids = Vec::new();
        for title in ["one", "two", "three"] {
            ids.push(store.create(NoteDraft::new(title, "")).unwrap().id);
            clock.advance_millis(10);
        }
        let listed: Vec<String> = store.list_all().into_iter().map(|n| n.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);
    }

    #[test]
    fn creates_in_the_same_millisecond_get_distinct_ids() {
        let (_, _, store) = setup();
        let a = store.create(NoteDraft::new("a", "")).unwrap();
        let b = store.create(NoteDraft::new("b", "")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.list_all().len(), 2);
    }

    #[test]
    fn update_keeps_identity_and_bumps_updated_at() {
        let (_, clock, store) = setup();
        let created = store.create(NoteDraft::new("a", "body")).unwrap();
        clock.advance_millis(500);

        let updated = store
            .update(&created.id, NotePatch::title("b"))
            .unwrap()
            .expect("note exists");

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "b");
        assert_eq!(updated.content, "body");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(store.get(&created.id), Some(updated));
    }

    #[test]
    fn update_without_clock_movement_still_advances() {
        let (_, _, store) = setup();
        let created = store.create(NoteDraft::new("a", "")).unwrap();
        let updated = store
            .update(&created.id, NotePatch::content("x"))
            .unwrap()
            .unwrap();
        assert!(updated.updated_at > created.updated_at);
    }

    #[test]
    fn update_of_seeded_note() {
        let port = Arc::new(MemoryStore::with_entries([(
            NOTES_KEY,
            r#"[{"id":"1","title":"a","content":"","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}]"#,
        )]));
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let store = NoteStore::with_clock(port, Arc::new(ManualClock::new(now)));

        let updated = store.update("1", NotePatch::title("b")).unwrap().unwrap();
        assert_eq!(updated.id, "1");
        assert_eq!(updated.title, "b");
        assert_eq!(
            updated.created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(updated.updated_at, now);
    }

    #[test]
    fn update_missing_record_does_not_write() {
        let (port, _, store) = setup();
        assert!(store.update("nope", NotePatch::title("x")).unwrap().is_none());
        assert_eq!(port.write_count(), 0);
    }

    #[test]
    fn delete_reports_and_writes_only_on_change() {
        let (port, _, store) = setup();
        let created = store.create(NoteDraft::new("a", "")).unwrap();
        assert_eq!(port.write_count(), 1);

        assert!(!store.delete("missing").unwrap());
        assert_eq!(port.write_count(), 1);

        assert!(store.delete(&created.id).unwrap());
        assert_eq!(port.write_count(), 2);
        assert_eq!(store.get(&created.id), None);
    }

    #[test]
    fn empty_or_corrupt_storage_reads_as_empty() {
        let (_, _, store) = setup();
        assert!(store.list_all().is_empty());

        let port = Arc::new(MemoryStore::with_entries([(NOTES_KEY, "{oops")]));
        let store = NoteStore::new(port);
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn snippets_missing_optional_fields_still_load() {
        let port = Arc::new(MemoryStore::with_entries([(
            SNIPPETS_KEY,
            r#"[
                {"id":"2","title":"full","code":"x","language":"rust","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"},
                {"id":"1","title":"bare","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}
            ]"#,
        )]));
        let store = SnippetStore::new(port.clone());

        let listed = store.list_all();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].language, "");

        store.create(SnippetDraft::default()).unwrap();
        let raw = port.get(SNIPPETS_KEY).unwrap().unwrap();
        let stored: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn unreadable_entries_survive_writes() {
        let port = Arc::new(MemoryStore::with_entries([(
            NOTES_KEY,
            r#"[
                {"id":"1","title":"ok","content":"","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"},
                {"id":"1700000000000","title":"no updatedAt","createdAt":"2024-01-01T00:00:00Z"},
                42
            ]"#,
        )]));
        let now = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        let store = NoteStore::with_clock(port.clone(), Arc::new(ManualClock::new(now)));

        assert_eq!(store.list_all().len(), 1);

        let created = store.create(NoteDraft::new("new", "")).unwrap();
        assert_eq!(created.id, "1700000000001");
        store.update("1", NotePatch::title("edited")).unwrap();
        store.delete("1").unwrap();

        let raw = port.get(NOTES_KEY).unwrap().unwrap();
        let stored: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0]["id"], "1700000000001");
        assert_eq!(stored[1]["title"], "no updatedAt");
        assert_eq!(stored[2], 42);
    }

    #[test]
    fn update_never_moves_before_creation() {
        let port = Arc::new(MemoryStore::with_entries([(
            NOTES_KEY,
            r#"[{"id":"1","title":"a","content":"","createdAt":"2024-03-01T00:00:00Z","updatedAt":"2024-02-01T00:00:00Z"}]"#,
        )]));
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let store = NoteStore::with_clock(port, Arc::new(ManualClock::new(now)));

        let updated = store.update("1", NotePatch::title("b")).unwrap().unwrap();
        assert_eq!(
            updated.updated_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn write_failures_are_surfaced() {
        let (port, _, store) = setup();
        port.set_fail_writes(true);
        let err = store.create(NoteDraft::new("a", "")).unwrap_err();
        assert!(matches!(err, DevkitError::StorageUnavailable { .. }));
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn snippets_filter_by_tag_and_search() {
        let port = Arc::new(MemoryStore::new());
        let store = SnippetStore::new(port);
        store
            .create(SnippetDraft {
                title: "Read a file".into(),
                code: "std::fs::read_to_string(path)".into(),
                language: "rust".into(),
                tags: ["io".to_string(), "Rust".to_string()].into(),
                ..SnippetDraft::default()
            })
            .unwrap();
        store
            .create(SnippetDraft {
                title: "Debounce".into(),
                code: "setTimeout(fn, ms)".into(),
                language: "javascript".into(),
                ..SnippetDraft::default()
            })
            .unwrap();

        let tagged = store.with_tag("rust");
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].title, "Read a file");

        let found = store.search("debounce");
        assert_eq!(found.first().map(|s| s.title.as_str()), Some("Debounce"));
    }
}
