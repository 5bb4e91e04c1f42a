//! Backup records and content hashing

use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// What caused a backup to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Scheduled,
    Manual,
    PreMigration,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::PreMigration => write!(f, "pre-migration"),
        }
    }
}

/// Index entry for one persisted snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Millisecond timestamp, strictly increasing across records
    pub id: String,
    pub captured_at: DateTime<Utc>,
    /// SHA-256 hex of the canonical state JSON
    pub state_hash: String,
    /// Size of the serialized state
    pub size_bytes: u64,
    pub triggered_by: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BackupRecord {
    /// Numeric form of the id, if it is one
    pub fn sequence(&self) -> Option<i64> {
        self.id.parse().ok()
    }
}

/// On-disk layout of one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub metadata: BackupRecord,
    pub state: Value,
}

/// JSON text with object keys sorted at every level
///
/// Equal values always produce equal text, whatever their key insertion order.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// SHA-256 hex digest of the canonical JSON of `state`
pub fn state_hash(state: &Value) -> Result<String> {
    let canonical = canonical_json(state)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}
