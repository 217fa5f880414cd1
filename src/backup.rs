//! Zip backups of everything in the key-value store.
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use log::{debug, info, warn};
use serde_json::Value;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, ZipArchive, ZipWriter};

use crate::{
    ids::Clock, DevkitError, KeyValueStore, RestoreSummary, Result, WriteOp, ALL_KEYS,
};

const BACKUP_PREFIX: &str = "devkit_backup_";

/// How many `-N` suffixes to try when a backup name is taken.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes every stored collection into a timestamped zip under `backup_dir`.
///
/// The archive is named after `clock`'s current time; an existing archive is
/// never overwritten. Keeps at most `max_backups` archives in the directory
/// (0 keeps all).
pub fn create_backup(
    port: &dyn KeyValueStore,
    clock: &dyn Clock,
    backup_dir: &Path,
    max_backups: usize,
) -> Result<PathBuf> {
    if !backup_dir.exists() {
        fs::create_dir_all(backup_dir).map_err(|e| DevkitError::BackupFailed {
            message: e.to_string(),
        })?;
    }

    let timestamp = clock.now().format("%Y%m%d_%H%M%S%.3f").to_string();
    let (file, backup_path) = create_backup_file(backup_dir, &timestamp)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut written = 0;
    for key in ALL_KEYS {
        let Some(value) = port.get(key)? else {
            debug!("Nothing stored under {}, skipping", key);
            continue;
        };
        zip.start_file(format!("{}.json", key), options)?;
        zip.write_all(value.as_bytes())
            .map_err(|e| DevkitError::BackupFailed {
                message: format!("Failed to write {} to backup: {}", key, e),
            })?;
        written += 1;
    }
    zip.finish()?;

    cleanup_old_backups(backup_dir, max_backups);

    info!(
        "Backup with {} collections created at {}",
        written,
        backup_path.display()
    );
    Ok(backup_path)
}

/// Creates a fresh archive file, adding a `-N` suffix while the name is taken.
fn create_backup_file(backup_dir: &Path, timestamp: &str) -> Result<(File, PathBuf)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = match attempt {
            0 => format!("{}{}.zip", BACKUP_PREFIX, timestamp),
            n => format!("{}{}-{}.zip", BACKUP_PREFIX, timestamp, n),
        };
        let path = backup_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Backup name {} is taken", path.display());
            }
            Err(e) => {
                return Err(DevkitError::BackupFailed {
                    message: format!("Failed to create {}: {}", path.display(), e),
                })
            }
        }
    }
    Err(DevkitError::BackupFailed {
        message: format!("No free backup name for {} in {}", timestamp, backup_dir.display()),
    })
}

/// Removes the oldest backups beyond `max_backups`.
fn cleanup_old_backups(backup_dir: &Path, max_backups: usize) {
    if max_backups == 0 {
        return;
    }

    #[derive(Debug, Eq)]
    struct BackupFile {
        path: PathBuf,
        modified_time: SystemTime,
    }

    impl PartialEq for BackupFile {
        fn eq(&self, other: &Self) -> bool {
            self.cmp(other) == Ordering::Equal
        }
    }

    impl PartialOrd for BackupFile {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for BackupFile {
        // file names carry the creation time, so they break mtime ties
        fn cmp(&self, other: &Self) -> Ordering {
            self.modified_time
                .cmp(&other.modified_time)
                .then_with(|| self.path.cmp(&other.path))
        }
    }

    // min-heap: oldest backup on top
    let mut newest: BinaryHeap<Reverse<BackupFile>> = BinaryHeap::with_capacity(max_backups + 1);
    let mut removed = 0;

    for entry in WalkDir::new(backup_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        let path = entry.path();
        let is_backup = path.is_file()
            && path.extension().is_some_and(|ext| ext == "zip")
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(BACKUP_PREFIX));
        if !is_backup {
            continue;
        }
        let Some(modified_time) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            continue;
        };

        newest.push(Reverse(BackupFile {
            path: path.to_path_buf(),
            modified_time,
        }));

        if newest.len() > max_backups {
            if let Some(Reverse(oldest)) = newest.pop() {
                match fs::remove_file(&oldest.path) {
                    Ok(_) => {
                        removed += 1;
                        debug!("Removed old backup: {}", oldest.path.display());
                    }
                    Err(e) => warn!(
                        "Failed to remove old backup {}: {}",
                        oldest.path.display(),
                        e
                    ),
                }
            }
        }
    }

    if removed > 0 {
        debug!("Kept {} backups, removed {}", newest.len(), removed);
    }
}

/// Restores every known collection found in the archive at `backup_path`.
///
/// Each entry must hold a JSON array. All collections are written in one
/// batch, so a failed restore leaves storage unchanged.
pub fn restore_backup(port: &dyn KeyValueStore, backup_path: &Path) -> Result<RestoreSummary> {
    if !backup_path.is_file() {
        return Err(DevkitError::RestoreFailed {
            message: format!("Backup file not found: {}", backup_path.display()),
        });
    }
    if backup_path.extension().map_or(true, |ext| ext != "zip") {
        return Err(DevkitError::RestoreFailed {
            message: format!("Not a valid ZIP file: {}", backup_path.display()),
        });
    }

    let mut archive = ZipArchive::new(File::open(backup_path)?)?;
    let mut summary = RestoreSummary {
        backup_file: backup_path.to_path_buf(),
        ..RestoreSummary::default()
    };
    let mut batch = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();

        let key = name
            .strip_suffix(".json")
            .and_then(|stem| ALL_KEYS.iter().find(|k| **k == stem));
        let Some(key) = key else {
            debug!("Skipping unknown backup entry {}", name);
            summary.entries_skipped.push(name);
            continue;
        };

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| DevkitError::RestoreFailed {
                message: format!("Failed to read {}: {}", name, e),
            })?;

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(_)) => {}
            _ => {
                return Err(DevkitError::RestoreFailed {
                    message: format!("{} does not hold a JSON array", name),
                })
            }
        }

        batch.push(WriteOp::set(*key, content));
        summary.keys_restored.push(key.to_string());
    }

    if !batch.is_empty() {
        port.apply_batch(batch)?;
    }

    info!(
        "Restored {} collections from {}, skipped {} entries",
        summary.keys_restored.len(),
        backup_path.display(),
        summary.entries_skipped.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ids::{ManualClock, SystemClock},
        MemoryStore, NOTES_KEY, TASKS_KEY,
    };
    use chrono::{TimeZone, Utc};

    #[test]
    fn backup_then_restore_into_fresh_store() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = MemoryStore::with_entries([(NOTES_KEY, "[]"), (TASKS_KEY, r#"[{"id":"1"}]"#)]);

        let path =
            create_backup(&source, &SystemClock, temp.path(), 5).expect("backup should succeed");
        assert!(path.exists());

        let target = MemoryStore::new();
        let summary = restore_backup(&target, &path).expect("restore should succeed");

        assert_eq!(summary.keys_restored, [NOTES_KEY, TASKS_KEY]);
        assert!(summary.entries_skipped.is_empty());
        assert_eq!(target.get(TASKS_KEY).unwrap().as_deref(), Some(r#"[{"id":"1"}]"#));
        assert_eq!(target.write_count(), 1);
    }

    #[test]
    fn old_backups_are_pruned() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = MemoryStore::with_entries([(NOTES_KEY, "[]")]);
        for _ in 0..4 {
            create_backup(&source, &SystemClock, temp.path(), 2).expect("backup should succeed");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let count = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn backups_in_the_same_millisecond_get_distinct_files() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let first = MemoryStore::with_entries([(NOTES_KEY, "[]")]);
        let second = MemoryStore::with_entries([(TASKS_KEY, "[]")]);

        let a = create_backup(&first, &clock, temp.path(), 0).expect("backup should succeed");
        let b = create_backup(&second, &clock, temp.path(), 0).expect("backup should succeed");

        assert_eq!(
            a.file_name().and_then(|n| n.to_str()),
            Some("devkit_backup_20240501_120000.000.zip")
        );
        assert_eq!(
            b.file_name().and_then(|n| n.to_str()),
            Some("devkit_backup_20240501_120000.000-1.zip")
        );

        let restored = MemoryStore::new();
        let summary = restore_backup(&restored, &a).expect("restore should succeed");
        assert_eq!(summary.keys_restored, [NOTES_KEY]);
        let summary = restore_backup(&restored, &b).expect("restore should succeed");
        assert_eq!(summary.keys_restored, [TASKS_KEY]);
    }

    #[test]
    fn restore_rejects_missing_file() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let err = restore_backup(&MemoryStore::new(), &temp.path().join("nope.zip")).unwrap_err();
        assert!(matches!(err, DevkitError::RestoreFailed { .. }));
    }
}
