//! Persistent snapshots of the document.
//!
//! One document per editor: the serialized tree lives under a single fixed
//! key and every save overwrites the previous one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use relative_path::RelativePathBuf;

use crate::error::StoreError;
use crate::model::Document;

/// Key the snapshot is stored under
pub const SNAPSHOT_KEY: &str = "assigncraft-snapshot";

/// Interval between unconditional saves
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(15);

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(RelativePathBuf::from(format!("{key}.json")).to_path(&self.dir))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

/// Saves the document on mutation and on a fixed interval, keeping only
/// the latest snapshot.
#[derive(Debug)]
pub struct SnapshotStore<S> {
    store: S,
    interval: Duration,
    last_tick: Instant,
    saved_version: Option<u64>,
    last_saved: Option<DateTime<Local>>,
}

impl<S: KeyValueStore> SnapshotStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_interval(store, DEFAULT_AUTOSAVE_INTERVAL)
    }

    pub fn with_interval(store: S, interval: Duration) -> Self {
        Self {
            store,
            interval,
            last_tick: Instant::now(),
            saved_version: None,
            last_saved: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// When the last save completed
    pub fn last_saved(&self) -> Option<DateTime<Local>> {
        self.last_saved
    }

    /// Store the document, overwriting any earlier snapshot
    pub fn save(&mut self, doc: &Document) -> Result<DateTime<Local>, StoreError> {
        self.store.set(SNAPSHOT_KEY, &doc.serialize())?;
        let saved_at = Local::now();
        self.saved_version = Some(doc.version());
        self.last_saved = Some(saved_at);
        log::info!("Autosaved snapshot at {}", saved_at.format("%H:%M:%S"));
        Ok(saved_at)
    }

    /// The last stored blob, if any
    pub fn load(&self) -> Result<Option<String>, StoreError> {
        self.store.get(SNAPSHOT_KEY)
    }

    /// Treat the document as already persisted, e.g. right after restoring it
    pub fn mark_clean(&mut self, doc: &Document) {
        self.saved_version = Some(doc.version());
    }

    pub fn has_unsaved_changes(&self, doc: &Document) -> bool {
        self.saved_version != Some(doc.version())
    }

    /// Save after a mutation. Nothing is written when the document has not
    /// changed since the last save.
    pub fn on_mutation(&mut self, doc: &Document) -> Result<Option<DateTime<Local>>, StoreError> {
        if !self.has_unsaved_changes(doc) {
            return Ok(None);
        }
        self.save(doc).map(Some)
    }

    /// Save once the interval has elapsed since the previous interval save
    pub fn tick(
        &mut self,
        doc: &Document,
        now: Instant,
    ) -> Result<Option<DateTime<Local>>, StoreError> {
        if now.saturating_duration_since(self.last_tick) < self.interval {
            return Ok(None);
        }
        self.last_tick = now;
        self.save(doc).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Anchor;
    use rstest::rstest;
    use tempfile::TempDir;

    fn typed(text: &str) -> Document {
        let mut doc = Document::new();
        let run = doc.leaves()[0];
        doc.insert_text(&Anchor::new(run, 0), text).unwrap();
        doc
    }

    #[test]
    fn test_save_overwrites_and_load_returns_latest() {
        let mut snapshots = SnapshotStore::new(MemoryStore::new());
        assert_eq!(snapshots.load().unwrap(), None);

        snapshots.save(&typed("first")).unwrap();
        snapshots.save(&typed("second")).unwrap();

        let blob = snapshots.load().unwrap().unwrap();
        assert_eq!(Document::from_snapshot(&blob).unwrap().plain_text(), "second");
        assert!(snapshots.last_saved().is_some());
    }

    #[test]
    fn test_on_mutation_skips_unchanged_document() {
        let mut snapshots = SnapshotStore::new(MemoryStore::new());
        let mut doc = typed("draft");

        assert!(snapshots.on_mutation(&doc).unwrap().is_some());
        assert!(snapshots.on_mutation(&doc).unwrap().is_none());

        let run = doc.leaves()[0];
        doc.insert_text(&Anchor::new(run, 5), "!").unwrap();
        assert!(snapshots.has_unsaved_changes(&doc));
        assert!(snapshots.on_mutation(&doc).unwrap().is_some());
    }

    #[test]
    fn test_tick_saves_after_interval() {
        let mut snapshots =
            SnapshotStore::with_interval(MemoryStore::new(), Duration::from_secs(15));
        let doc = typed("x");
        let start = Instant::now();

        assert!(snapshots.tick(&doc, start).unwrap().is_none());
        assert!(
            snapshots
                .tick(&doc, start + Duration::from_secs(16))
                .unwrap()
                .is_some()
        );
        assert!(
            snapshots
                .tick(&doc, start + Duration::from_secs(20))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_file_store_persists_between_instances() {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::new(temp.path().join("store"));
        store.set(SNAPSHOT_KEY, "{\"format\":1}").unwrap();

        let reopened = FileStore::new(temp.path().join("store"));
        assert_eq!(
            reopened.get(SNAPSHOT_KEY).unwrap().as_deref(),
            Some("{\"format\":1}")
        );
        assert!(temp.path().join("store/assigncraft-snapshot.json").exists());
    }

    #[test]
    fn test_file_store_missing_key() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        assert_eq!(store.get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[rstest]
    #[case("")]
    #[case("../escape")]
    #[case("nested/key")]
    #[case(".hidden")]
    fn test_file_store_rejects_unsafe_keys(#[case] key: &str) {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::new(temp.path());
        assert!(matches!(
            store.set(key, "blob"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
