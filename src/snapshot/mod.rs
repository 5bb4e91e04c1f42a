//! State snapshots for disaster recovery
//!
//! Content-hashed, deduplicated captures with a bounded history, restorable by id.

pub mod engine;
pub mod scheduler;
pub mod store;
pub mod types;

pub use engine::SnapshotEngine;
pub use scheduler::{SnapshotScheduler, StateSource};
pub use store::{FsSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use types::{state_hash, BackupRecord, Trigger};
