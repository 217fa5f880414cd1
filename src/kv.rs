//! Key-value storage port.
//!
//! Every collection in the application is persisted as one JSON string under
//! a fixed key. The stores and the board only see the [`KeyValueStore`]
//! trait, so tests can plug in [`MemoryStore`] while the binary uses the
//! file-backed [`FileStore`].
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use log::{debug, error, info, trace};
use tempfile::NamedTempFile;

use crate::{DevkitError, Result};

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    Remove { key: String },
}

impl WriteOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        WriteOp::Remove { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. } | WriteOp::Remove { key } => key,
        }
    }

    fn apply_to(self, map: &mut BTreeMap<String, String>) {
        match self {
            WriteOp::Set { key, value } => {
                map.insert(key, value);
            }
            WriteOp::Remove { key } => {
                map.remove(&key);
            }
        }
    }
}

/// Synchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value under `key`, `None` when it was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.apply_batch(vec![WriteOp::set(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.apply_batch(vec![WriteOp::remove(key)])
    }

    /// Applies every operation or none of them.
    fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<()>;
}

/// In-memory store.
///
/// Counts the writes it receives and can be told to reject writes, which is
/// how tests observe persistence behaviour.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with raw values, without counting writes.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Number of successful `set`/`remove`/`apply_batch` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write fail, as a full or disabled storage would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| DevkitError::LockAcquisitionFailed {
                message: "Failed to acquire lock on memory store".to_string(),
            })?;
        Ok(entries.get(key).cloned())
    }

    fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            let key = ops.first().map(|op| op.key().to_string()).unwrap_or_default();
            return Err(DevkitError::StorageUnavailable {
                key,
                message: "storage quota exceeded".to_string(),
            });
        }

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DevkitError::LockAcquisitionFailed {
                message: "Failed to acquire lock on memory store".to_string(),
            })?;
        for op in ops {
            op.apply_to(&mut entries);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// File-backed store.
///
/// All keys live in a single JSON document. Each write rewrites the whole
/// document through a temporary file and a rename, so a batch either lands
/// completely or not at all.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating storage directory: {}", parent.display());
                fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create storage directory: {}", e);
                    DevkitError::DirectoryError {
                        path: parent.to_path_buf(),
                    }
                })?;
            }
        }
        info!("Using storage file {}", path.display());
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            trace!("Storage file {} does not exist yet", self.path.display());
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let document = serde_json::from_str(&content).map_err(|e| {
            error!(
                "Storage file {} is not a valid document: {}",
                self.path.display(),
                e
            );
            DevkitError::InvalidFormat {
                message: format!("{}: {}", self.path.display(), e),
            }
        })?;
        Ok(document)
    }

    fn write_document(&self, document: &BTreeMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp_file = NamedTempFile::new_in(dir)?;

        trace!("Serializing storage document");
        let json = serde_json::to_string_pretty(document)?;

        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;

        debug!("Performing atomic move of temporary file to {}", self.path.display());
        temp_file.persist(&self.path).map_err(|e| DevkitError::Io(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| DevkitError::LockAcquisitionFailed {
                message: "Failed to acquire lock on storage file".to_string(),
            })?;
        Ok(self.read_document()?.remove(key))
    }

    fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| DevkitError::LockAcquisitionFailed {
                message: "Failed to acquire lock on storage file".to_string(),
            })?;

        let keys: Vec<String> = ops.iter().map(|op| op.key().to_string()).collect();
        let mut document = self.read_document()?;
        for op in ops {
            op.apply_to(&mut document);
        }

        self.write_document(&document).map_err(|e| {
            error!("Failed to write keys {:?}: {}", keys, e);
            DevkitError::StorageUnavailable {
                key: keys.join(","),
                message: e.to_string(),
            }
        })?;
        trace!("Wrote keys {:?}", keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        store.remove("missing").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn memory_store_rejects_writes_when_failing() {
        let store = MemoryStore::with_entries([("k", "old")]);
        store.set_fail_writes(true);
        let err = store
            .apply_batch(vec![WriteOp::set("k", "new"), WriteOp::remove("other")])
            .unwrap_err();
        assert!(matches!(err, DevkitError::StorageUnavailable { ref key, .. } if key == "k"));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("old"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("nested").join("storage.json");

        let store = FileStore::open(&path).expect("store should open");
        store
            .apply_batch(vec![WriteOp::set("a", "[1]"), WriteOp::set("b", "[2]")])
            .expect("batch should apply");
        store.remove("a").expect("remove should apply");

        let reopened = FileStore::open(&path).expect("store should reopen");
        assert_eq!(reopened.get("a").unwrap(), None);
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn file_store_reports_corrupt_document() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(matches!(
            store.get("a"),
            Err(DevkitError::InvalidFormat { .. })
        ));
    }
}
