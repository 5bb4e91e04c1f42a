//! Deduplicating, bounded snapshot history
//!
//! Every write goes body first, index second. A body without an index entry
//! is an orphan and is removed the next time the engine opens; an index entry
//! without a body is dropped at the same point.

use crate::errors::{Result, RouterError};
use crate::snapshot::store::{FsSnapshotStore, SnapshotStore};
use crate::snapshot::types::{state_hash, BackupRecord, SnapshotFile, Trigger};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

struct History {
    records: Vec<BackupRecord>,
    last_id: i64,
}

pub struct SnapshotEngine {
    store: Box<dyn SnapshotStore>,
    max_backup_files: usize,
    history: Mutex<History>,
}

impl SnapshotEngine {
    /// Open the directory store at `dir`
    pub fn open_dir(dir: impl Into<PathBuf>, max_backup_files: usize) -> Result<Self> {
        Self::open(Box::new(FsSnapshotStore::open(dir)?), max_backup_files)
    }

    /// Load the index from `store` and reconcile it with the stored bodies
    pub fn open(store: Box<dyn SnapshotStore>, max_backup_files: usize) -> Result<Self> {
        if max_backup_files == 0 {
            return Err(RouterError::Config(
                "max_backup_files must be greater than 0".to_string(),
            ));
        }

        let indexed = store.load_index()?.unwrap_or_default();
        let stored: HashSet<String> = store.keys()?.into_iter().collect();
        let indexed_count = indexed.len();

        let mut records: Vec<BackupRecord> = indexed
            .into_iter()
            .filter(|record| {
                let present = stored.contains(&record.id);
                if !present {
                    warn!(id = %record.id, "Dropping index entry without snapshot file");
                }
                present
            })
            .collect();

        let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        for orphan in stored.iter().filter(|key| !known.contains(key.as_str())) {
            warn!(id = %orphan, "Removing snapshot file without index entry");
            store.delete(orphan)?;
        }

        let evicted = split_excess(&mut records, max_backup_files);
        for record in &evicted {
            store.delete(&record.id)?;
        }

        if records.len() != indexed_count {
            store.save_index(&records)?;
        }

        let last_id = records.iter().filter_map(BackupRecord::sequence).max().unwrap_or(0);
        debug!(count = records.len(), "Snapshot history loaded");

        Ok(Self {
            store,
            max_backup_files,
            history: Mutex::new(History { records, last_id }),
        })
    }

    /// Write a scheduled snapshot unless `state` matches the latest one
    pub fn capture_if_changed(&self, state: &Value) -> Result<Option<BackupRecord>> {
        let hash = state_hash(state)?;
        let mut history = self.lock();

        if history.records.last().map(|r| r.state_hash.as_str()) == Some(hash.as_str()) {
            debug!(hash = %hash, "State unchanged, skipping snapshot");
            return Ok(None);
        }

        self.write(&mut history, state, hash, Trigger::Scheduled, None)
            .map(Some)
    }

    /// Always write, regardless of the last hash
    pub fn create_manual(&self, state: &Value, reason: &str) -> Result<BackupRecord> {
        self.checkpoint(state, Trigger::Manual, reason)
    }

    /// Checkpoint taken before a migration step
    pub fn create_pre_migration(&self, state: &Value, reason: &str) -> Result<BackupRecord> {
        self.checkpoint(state, Trigger::PreMigration, reason)
    }

    /// State stored under `id`; history is not modified
    pub fn restore(&self, id: &str) -> Result<Value> {
        let record = self
            .lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| RouterError::SnapshotNotFound(id.to_string()))?;

        let corrupt = |reason: String| RouterError::SnapshotCorrupt {
            id: id.to_string(),
            reason,
        };

        let bytes = self
            .store
            .get(id)?
            .ok_or_else(|| corrupt("snapshot file is missing".to_string()))?;

        let file: SnapshotFile =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if state_hash(&file.state)? != record.state_hash {
            return Err(corrupt("content hash does not match index".to_string()));
        }

        Ok(file.state)
    }

    /// Remove one snapshot and its index entry
    ///
    /// The index is saved first; a body left behind by a failed delete is an
    /// orphan and goes away on the next open.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut history = self.lock();
        let position = history
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RouterError::SnapshotNotFound(id.to_string()))?;

        let mut records = history.records.clone();
        records.remove(position);
        self.store
            .save_index(&records)
            .map_err(|e| RouterError::BackupWriteFailure(e.to_string()))?;
        history.records = records;

        if let Err(e) = self.store.delete(id) {
            warn!(id = %id, error = %e, "Failed to delete snapshot file");
        }

        info!(id = %id, "Snapshot deleted");
        Ok(())
    }

    /// Records in capture order, oldest first
    pub fn list(&self) -> Vec<BackupRecord> {
        self.lock().records.clone()
    }

    pub fn latest(&self) -> Option<BackupRecord> {
        self.lock().records.last().cloned()
    }

    pub fn last_hash(&self) -> Option<String> {
        self.lock().records.last().map(|r| r.state_hash.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.lock().records.iter().map(|r| r.size_bytes).sum()
    }

    pub fn max_backup_files(&self) -> usize {
        self.max_backup_files
    }

    fn checkpoint(&self, state: &Value, trigger: Trigger, reason: &str) -> Result<BackupRecord> {
        let hash = state_hash(state)?;
        let mut history = self.lock();
        self.write(&mut history, state, hash, trigger, Some(reason.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
        history: &mut History,
        state: &Value,
        state_hash: String,
        trigger: Trigger,
        reason: Option<String>,
    ) -> Result<BackupRecord> {
        let sequence = Utc::now().timestamp_millis().max(history.last_id + 1);
        let record = BackupRecord {
            id: sequence.to_string(),
            captured_at: Utc::now(),
            state_hash,
            size_bytes: serde_json::to_vec(state)?.len() as u64,
            triggered_by: trigger,
            reason,
        };

        let body = serde_json::to_vec_pretty(&SnapshotFile {
            metadata: record.clone(),
            state: state.clone(),
        })?;

        self.store
            .put(&record.id, &body)
            .map_err(|e| RouterError::BackupWriteFailure(e.to_string()))?;

        let mut records = history.records.clone();
        records.push(record.clone());
        let evicted = split_excess(&mut records, self.max_backup_files);

        if let Err(e) = self.store.save_index(&records) {
            if let Err(cleanup) = self.store.delete(&record.id) {
                warn!(id = %record.id, error = %cleanup, "Failed to remove unindexed snapshot");
            }
            return Err(RouterError::BackupWriteFailure(e.to_string()));
        }

        for old in &evicted {
            if let Err(e) = self.store.delete(&old.id) {
                warn!(id = %old.id, error = %e, "Failed to delete evicted snapshot");
            }
        }

        history.records = records;
        history.last_id = sequence;

        info!(
            id = %record.id,
            trigger = %record.triggered_by,
            size_bytes = record.size_bytes,
            evicted = evicted.len(),
            "Snapshot written"
        );

        Ok(record)
    }
}

/// Remove and return the oldest records beyond `max`
fn split_excess(records: &mut Vec<BackupRecord>, max: usize) -> Vec<BackupRecord> {
    let excess = records.len().saturating_sub(max);
    records.drain(..excess).collect()
}
