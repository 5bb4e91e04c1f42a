//! Periodic snapshot-on-change

use crate::errors::{Result, RouterError};
use crate::snapshot::engine::SnapshotEngine;
use crate::snapshot::types::BackupRecord;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Supplies the state to snapshot on each tick
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn current_state(&self) -> Result<Value>;
}

pub struct SnapshotScheduler {
    engine: Arc<SnapshotEngine>,
    source: Arc<dyn StateSource>,
    interval: Duration,
    telemetry: Option<TelemetryCollector>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotScheduler {
    pub fn new(engine: Arc<SnapshotEngine>, source: Arc<dyn StateSource>, interval: Duration) -> Self {
        Self {
            engine,
            source,
            interval,
            telemetry: None,
            task: Mutex::new(None),
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Read the current state and capture it if it changed
    ///
    /// Disk work runs on the blocking pool so request handling never waits on it.
    pub async fn run_once(&self) -> Result<Option<BackupRecord>> {
        let result = self.capture().await;

        if let Some(telemetry) = &self.telemetry {
            let timestamp = Instant::now();
            telemetry.record(match &result {
                Ok(Some(record)) => TelemetryEvent::BackupCreated {
                    id: record.id.clone(),
                    trigger: record.triggered_by,
                    size_bytes: record.size_bytes,
                    timestamp,
                },
                Ok(None) => TelemetryEvent::BackupSkipped { timestamp },
                Err(e) => TelemetryEvent::BackupFailed {
                    error: e.to_string(),
                    timestamp,
                },
            });
        }

        result
    }

    async fn capture(&self) -> Result<Option<BackupRecord>> {
        let state = self.source.current_state().await?;
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || engine.capture_if_changed(&state))
            .await
            .map_err(|e| RouterError::BackupWriteFailure(format!("Snapshot task failed: {}", e)))?
    }

    /// Start periodic capture; the first run happens immediately
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                match scheduler.run_once().await {
                    Ok(Some(record)) => debug!(id = %record.id, "Scheduled snapshot written"),
                    Ok(None) => {}
                    // Retried on the next tick
                    Err(e) => error!(error = %e, "Scheduled snapshot failed"),
                }
            }
        }));

        info!(interval_secs = interval.as_secs(), "Snapshot scheduler started");
    }

    pub fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            info!("Snapshot scheduler stopped");
        }
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::store::MemorySnapshotStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Returns the counter value, bumped only when asked
    #[derive(Default)]
    struct CounterSource {
        value: AtomicU64,
    }

    #[async_trait]
    impl StateSource for CounterSource {
        async fn current_state(&self) -> Result<Value> {
            Ok(json!({ "value": self.value.load(Ordering::SeqCst) }))
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl StateSource for BrokenSource {
        async fn current_state(&self) -> Result<Value> {
            Err(RouterError::Config("state unavailable".to_string()))
        }
    }

    fn engine() -> Arc<SnapshotEngine> {
        Arc::new(SnapshotEngine::open(Box::new(MemorySnapshotStore::new()), 50).unwrap())
    }

    #[tokio::test]
    async fn test_run_once_dedupes() {
        let engine = engine();
        let source = Arc::new(CounterSource::default());
        let telemetry = TelemetryCollector::new();
        let scheduler = SnapshotScheduler::new(
            Arc::clone(&engine),
            Arc::clone(&source) as Arc<dyn StateSource>,
            Duration::from_secs(3600),
        )
        .with_telemetry(telemetry.clone());

        assert!(scheduler.run_once().await.unwrap().is_some());
        assert!(scheduler.run_once().await.unwrap().is_none());
        source.value.store(1, Ordering::SeqCst);
        assert!(scheduler.run_once().await.unwrap().is_some());

        assert_eq!(engine.len(), 2);
        let stats = telemetry.get_stats();
        assert_eq!(stats.backups_created, 2);
        assert_eq!(stats.backups_skipped, 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let telemetry = TelemetryCollector::new();
        let scheduler = SnapshotScheduler::new(engine(), Arc::new(BrokenSource), Duration::from_secs(1))
            .with_telemetry(telemetry.clone());

        assert!(scheduler.run_once().await.is_err());
        assert_eq!(telemetry.get_stats().backups_failed, 1);
    }

    #[tokio::test]
    async fn test_start_captures_immediately() {
        let engine = engine();
        let scheduler = Arc::new(SnapshotScheduler::new(
            Arc::clone(&engine),
            Arc::new(CounterSource::default()),
            Duration::from_secs(3600),
        ));

        scheduler.start();
        scheduler.start();

        for _ in 0..50 {
            if !engine.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.len(), 1);
        scheduler.stop();
    }
}
