//! Snapshot storage backends
//!
//! A store is a flat key/value log of snapshot bodies plus one index.
//! The engine owns ordering, hashing and retention; stores only persist bytes.

use crate::errors::{Result, RouterError};
use crate::snapshot::types::BackupRecord;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const INDEX_FILE: &str = "index.json";
const SNAPSHOT_PREFIX: &str = "snapshot-";
const SNAPSHOT_SUFFIX: &str = ".json";

pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot body; must never leave a partial body under `key`
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// All stored keys, in no particular order
    fn keys(&self) -> Result<Vec<String>>;

    /// `None` when no index has been saved yet
    fn load_index(&self) -> Result<Option<Vec<BackupRecord>>>;

    fn save_index(&self, records: &[BackupRecord]) -> Result<()>;
}

/// Directory store: `snapshot-<key>.json` per snapshot plus `index.json`
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    /// Open `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", SNAPSHOT_PREFIX, key, SNAPSHOT_SUFFIX))
    }

    /// Write and sync a temp file in the same directory, then rename over the target
    ///
    /// The temp file is removed whenever the write or the rename fails.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RouterError::BackupWriteFailure(format!("Invalid path: {:?}", path)))?;
        let tmp = self.dir.join(format!(".{}.tmp", file_name));

        let written = write_synced(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl SnapshotStore for FsSnapshotStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.snapshot_path(key), bytes)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.snapshot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(key) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(SNAPSHOT_PREFIX))
                .and_then(|n| n.strip_suffix(SNAPSHOT_SUFFIX))
            {
                keys.push(key.to_string());
            }
        }

        Ok(keys)
    }

    fn load_index(&self) -> Result<Option<Vec<BackupRecord>>> {
        let path = self.dir.join(INDEX_FILE);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_index(&self, records: &[BackupRecord]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        self.write_atomic(&self.dir.join(INDEX_FILE), &bytes)
    }
}

/// In-process store, for embedding hosts without a filesystem and for tests
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    bodies: Mutex<BTreeMap<String, Vec<u8>>>,
    index: Mutex<Option<Vec<BackupRecord>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn load_index(&self) -> Result<Option<Vec<BackupRecord>>> {
        Ok(self
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_index(&self, records: &[BackupRecord]) -> Result<()> {
        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = Some(records.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::types::Trigger;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str) -> BackupRecord {
        BackupRecord {
            id: id.to_string(),
            captured_at: Utc::now(),
            state_hash: "0".repeat(64),
            size_bytes: 2,
            triggered_by: Trigger::Scheduled,
            reason: None,
        }
    }

    #[test]
    fn test_fs_put_get_delete() {
        let temp = TempDir::new().unwrap();
        let store = FsSnapshotStore::open(temp.path()).unwrap();

        store.put("100", b"{}").unwrap();
        assert!(temp.path().join("snapshot-100.json").exists());
        assert_eq!(store.get("100").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["100".to_string()]);

        store.delete("100").unwrap();
        store.delete("100").unwrap();
        assert_eq!(store.get("100").unwrap(), None);
    }

    #[test]
    fn test_fs_keys_ignore_other_files() {
        let temp = TempDir::new().unwrap();
        let store = FsSnapshotStore::open(temp.path()).unwrap();

        store.put("1", b"{}").unwrap();
        store.save_index(&[record("1")]).unwrap();
        fs::write(temp.path().join("notes.txt"), "x").unwrap();
        fs::write(temp.path().join(".snapshot-2.json.tmp"), "partial").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["1".to_string()]);
    }

    #[test]
    fn test_fs_failed_rename_removes_temp_file() {
        let temp = TempDir::new().unwrap();
        let store = FsSnapshotStore::open(temp.path()).unwrap();

        // A non-empty directory at the target makes the rename fail
        let blocker = temp.path().join("snapshot-7.json");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        assert!(store.put("7", b"{}").is_err());
        assert!(!temp.path().join(".snapshot-7.json.tmp").exists());
        assert!(blocker.join("keep").exists());
    }

    #[test]
    fn test_fs_index_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FsSnapshotStore::open(temp.path().join("nested")).unwrap();

        assert!(store.load_index().unwrap().is_none());
        let records = vec![record("1"), record("2")];
        store.save_index(&records).unwrap();
        assert_eq!(store.load_index().unwrap(), Some(records));
        assert!(!temp.path().join("nested").join(".index.json.tmp").exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        store.put("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        store.delete("a").unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert!(store.load_index().unwrap().is_none());
    }
}
