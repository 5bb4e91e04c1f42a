//! Service health monitor
//!
//! Polls each registered service on a shared interval, keeps one record per
//! service and publishes status transitions and per-cycle summaries on
//! broadcast channels. Polling is skipped entirely on non-local deployments.

use crate::capability::CapabilityDetector;
use crate::config::MonitorConfig;
use crate::errors::{Result, RouterError};
use crate::health::prober::{HealthProber, HttpProber};
use crate::health::types::{
    status_for, Feature, HealthStatus, HealthSummary, ProbeFailureKind, ProbeOutcome,
    ServiceHealthRecord, ServiceSpec, StatusTransition,
};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Broadcast buffer per event type; slow subscribers lag rather than block
const EVENT_CAPACITY: usize = 64;

pub struct ServiceHealthMonitor {
    services: Vec<ServiceSpec>,
    records: RwLock<HashMap<String, ServiceHealthRecord>>,
    detector: Arc<CapabilityDetector>,
    prober: Arc<dyn HealthProber>,
    poll_interval: Duration,
    poll_lock: tokio::sync::Mutex<()>,
    transitions: broadcast::Sender<StatusTransition>,
    summaries: broadcast::Sender<HealthSummary>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceHealthMonitor {
    /// Monitor `services`, all starting offline
    pub fn new(
        services: Vec<ServiceSpec>,
        detector: Arc<CapabilityDetector>,
        prober: Arc<dyn HealthProber>,
        config: &MonitorConfig,
    ) -> Self {
        let records = services
            .iter()
            .map(|spec| (spec.name.clone(), ServiceHealthRecord::offline(spec)))
            .collect();

        let (transitions, _) = broadcast::channel(EVENT_CAPACITY);
        let (summaries, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            services,
            records: RwLock::new(records),
            detector,
            prober,
            poll_interval: config.poll_interval(),
            poll_lock: tokio::sync::Mutex::new(()),
            transitions,
            summaries,
            task: Mutex::new(None),
        }
    }

    /// Monitor with the HTTP prober
    pub fn with_http_prober(
        services: Vec<ServiceSpec>,
        detector: Arc<CapabilityDetector>,
        config: &MonitorConfig,
    ) -> Result<Self> {
        let prober = HttpProber::new(config.probe_timeout())?;
        Ok(Self::new(services, detector, Arc::new(prober), config))
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StatusTransition> {
        self.transitions.subscribe()
    }

    pub fn subscribe_summaries(&self) -> broadcast::Receiver<HealthSummary> {
        self.summaries.subscribe()
    }

    /// Run one full poll cycle
    ///
    /// Returns `None` when skipped because the deployment is not local.
    /// Cycles never overlap; a caller arriving mid-cycle waits for it.
    pub async fn poll_once(&self) -> Option<HealthSummary> {
        let _guard = self.poll_lock.lock().await;

        if !self.detector.detect().await.is_local_deployment {
            debug!("Skipping health checks for hosted deployment");
            return None;
        }

        let probes = self.services.iter().map(|spec| async move {
            let outcome = self.prober.probe(&spec.url()).await;
            (spec, outcome)
        });

        for (spec, outcome) in join_all(probes).await {
            self.apply(spec, outcome);
        }

        let summary = self.summary();
        // No subscribers is fine
        let _ = self.summaries.send(summary.clone());

        debug!(
            healthy = summary.healthy,
            total = summary.total,
            "Health check cycle completed"
        );
        Some(summary)
    }

    /// Start periodic polling; the first cycle runs immediately
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.poll_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                monitor.poll_once().await;
            }
        }));

        info!(interval_secs = interval.as_secs(), "Health monitoring started");
    }

    pub fn stop_monitoring(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            info!("Health monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn record(&self, name: &str) -> Option<ServiceHealthRecord> {
        self.read_records().get(name).cloned()
    }

    /// All records in registration order
    pub fn records(&self) -> Vec<ServiceHealthRecord> {
        let records = self.read_records();
        self.services
            .iter()
            .filter_map(|spec| records.get(&spec.name).cloned())
            .collect()
    }

    /// Unknown services are never healthy
    pub fn is_healthy(&self, name: &str) -> bool {
        self.read_records()
            .get(name)
            .map(|r| r.status == HealthStatus::Healthy)
            .unwrap_or(false)
    }

    pub fn all_healthy(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.is_healthy(name))
    }

    pub fn healthy_services(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.status == HealthStatus::Healthy)
            .map(|r| r.name)
            .collect()
    }

    pub fn feature_enabled(&self, feature: Feature) -> bool {
        self.all_healthy(feature.required_services())
    }

    pub fn summary(&self) -> HealthSummary {
        let records = self.read_records();
        let healthy = records
            .values()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        HealthSummary::new(healthy, records.len())
    }

    fn read_records(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ServiceHealthRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the record for `spec`; publish a transition if the status changed
    fn apply(&self, spec: &ServiceSpec, outcome: ProbeOutcome) {
        let new_status = status_for(&outcome);
        let response_time_ms = outcome.elapsed_ms();
        let error = self.describe_failure(spec, &outcome);

        let record = ServiceHealthRecord {
            name: spec.name.clone(),
            endpoint_url: spec.base_url.clone(),
            status: new_status,
            last_checked_at: Utc::now(),
            last_response_time_ms: response_time_ms,
            last_error: error.clone(),
        };

        let old_status = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            records
                .insert(spec.name.clone(), record)
                .map(|previous| previous.status)
                .unwrap_or(HealthStatus::Offline)
        };

        if old_status == new_status {
            return;
        }

        match new_status {
            HealthStatus::Healthy => info!(
                service = %spec.name,
                from = %old_status,
                response_time_ms,
                "Service recovered"
            ),
            _ => warn!(
                service = %spec.name,
                from = %old_status,
                to = %new_status,
                error = error.as_deref().unwrap_or(""),
                "Service status changed"
            ),
        }

        let _ = self.transitions.send(StatusTransition {
            service: spec.name.clone(),
            old_status,
            new_status,
            response_time_ms,
            error,
        });
    }

    fn describe_failure(&self, spec: &ServiceSpec, outcome: &ProbeOutcome) -> Option<String> {
        let error = match outcome {
            ProbeOutcome::Reachable { status_code, .. } if *status_code < 400 => return None,
            ProbeOutcome::Reachable { status_code, .. } => RouterError::ServiceUnhealthy {
                service: spec.name.clone(),
                status_code: *status_code,
            },
            ProbeOutcome::Failed {
                kind: ProbeFailureKind::Timeout,
                ..
            } => RouterError::ProbeTimeout {
                service: spec.name.clone(),
                timeout_ms: self.prober.timeout().as_millis() as u64,
            },
            ProbeOutcome::Failed { message, .. } => return Some(message.clone()),
        };
        Some(error.to_string())
    }
}

impl Drop for ServiceHealthMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::StaticResources;
    use crate::config::{DetectorConfig, ServicesConfig};
    use crate::health::types::{EMBEDDING, INFERENCE, VECTOR_STORE};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::broadcast::error::TryRecvError;

    const UNREACHABLE: &str = "http://127.0.0.1:1";

    /// Replays queued outcomes per URL; anything unscripted is a refused connection
    #[derive(Default)]
    struct ScriptedProber {
        script: Mutex<HashMap<String, VecDeque<ProbeOutcome>>>,
    }

    impl ScriptedProber {
        fn push(&self, url: &str, outcome: ProbeOutcome) {
            self.script
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(outcome);
        }
    }

    #[async_trait]
    impl HealthProber for ScriptedProber {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            self.script
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(ProbeOutcome::Failed {
                    kind: ProbeFailureKind::Connection,
                    message: "connection refused".to_string(),
                    elapsed_ms: 1,
                })
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
    }

    fn ok(elapsed_ms: u64) -> ProbeOutcome {
        ProbeOutcome::Reachable {
            status_code: 200,
            elapsed_ms,
        }
    }

    fn services() -> Vec<ServiceSpec> {
        vec![
            ServiceSpec::new(INFERENCE, "http://inference.test", "/api/tags"),
            ServiceSpec::new(VECTOR_STORE, "http://vector.test", "/health"),
            ServiceSpec::new(EMBEDDING, "http://embedding.test", "/health"),
        ]
    }

    fn detector(local: bool) -> Arc<CapabilityDetector> {
        let services = ServicesConfig {
            inference_url: UNREACHABLE.to_string(),
            vector_store_url: UNREACHABLE.to_string(),
            embedding_url: UNREACHABLE.to_string(),
        };
        let config = DetectorConfig {
            local_override: local,
            ..DetectorConfig::default()
        };
        let resources = Arc::new(StaticResources {
            memory_gb: 2.0,
            cpu_cores: 2,
            has_accelerator: false,
        });
        Arc::new(CapabilityDetector::with_resources(&services, &config, resources).unwrap())
    }

    fn monitor(prober: Arc<ScriptedProber>, local: bool) -> ServiceHealthMonitor {
        ServiceHealthMonitor::new(services(), detector(local), prober, &MonitorConfig::default())
    }

    #[tokio::test]
    async fn test_recovery_emits_one_transition() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://inference.test/api/tags", ok(40));
        let monitor = monitor(Arc::clone(&prober), true);
        let mut transitions = monitor.subscribe_transitions();

        assert!(!monitor.is_healthy(INFERENCE));
        monitor.poll_once().await.unwrap();

        let event = transitions.try_recv().unwrap();
        assert_eq!(
            event,
            StatusTransition {
                service: INFERENCE.to_string(),
                old_status: HealthStatus::Offline,
                new_status: HealthStatus::Healthy,
                response_time_ms: 40,
                error: None,
            }
        );
        assert!(matches!(transitions.try_recv(), Err(TryRecvError::Empty)));
        assert!(monitor.is_healthy(INFERENCE));
        assert_eq!(monitor.record(INFERENCE).unwrap().last_response_time_ms, 40);
    }

    #[tokio::test]
    async fn test_unchanged_status_emits_nothing() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://inference.test/api/tags", ok(10));
        prober.push("http://inference.test/api/tags", ok(12));
        let monitor = monitor(Arc::clone(&prober), true);
        let mut transitions = monitor.subscribe_transitions();

        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        assert!(transitions.try_recv().is_ok());
        assert!(matches!(transitions.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(monitor.record(INFERENCE).unwrap().last_response_time_ms, 12);
    }

    #[tokio::test]
    async fn test_error_status_degrades_from_offline() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push(
            "http://embedding.test/health",
            ProbeOutcome::Reachable {
                status_code: 503,
                elapsed_ms: 8,
            },
        );
        let monitor = monitor(Arc::clone(&prober), true);
        let mut transitions = monitor.subscribe_transitions();

        monitor.poll_once().await.unwrap();

        let event = transitions.try_recv().unwrap();
        assert_eq!(event.service, EMBEDDING);
        assert_eq!(event.new_status, HealthStatus::Degraded);
        assert!(event.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_healthy_to_offline_on_timeout() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://vector.test/health", ok(5));
        prober.push(
            "http://vector.test/health",
            ProbeOutcome::Failed {
                kind: ProbeFailureKind::Timeout,
                message: "operation timed out".to_string(),
                elapsed_ms: 5000,
            },
        );
        let monitor = monitor(Arc::clone(&prober), true);
        let mut transitions = monitor.subscribe_transitions();

        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        assert_eq!(transitions.try_recv().unwrap().new_status, HealthStatus::Healthy);
        let down = transitions.try_recv().unwrap();
        assert_eq!(down.old_status, HealthStatus::Healthy);
        assert_eq!(down.new_status, HealthStatus::Offline);
        assert!(down.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_summary_published_every_cycle() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://inference.test/api/tags", ok(3));
        let monitor = monitor(Arc::clone(&prober), true);
        let mut summaries = monitor.subscribe_summaries();

        let first = monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        assert_eq!(first.healthy, 1);
        assert_eq!(first.total, 3);
        assert_eq!(summaries.try_recv().unwrap(), first);
        assert_eq!(summaries.try_recv().unwrap().healthy, 0);
    }

    #[tokio::test]
    async fn test_hosted_deployment_skips_polling() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://inference.test/api/tags", ok(3));
        let monitor = monitor(Arc::clone(&prober), false);
        let mut summaries = monitor.subscribe_summaries();

        assert!(monitor.poll_once().await.is_none());
        assert!(matches!(summaries.try_recv(), Err(TryRecvError::Empty)));
        assert!(!monitor.is_healthy(INFERENCE));
    }

    #[tokio::test]
    async fn test_feature_gates() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://inference.test/api/tags", ok(3));
        prober.push("http://embedding.test/health", ok(3));
        let monitor = monitor(Arc::clone(&prober), true);

        monitor.poll_once().await.unwrap();

        assert!(monitor.feature_enabled(Feature::SemanticIntelligence));
        assert!(!monitor.feature_enabled(Feature::VectorSearch));
        assert!(!monitor.feature_enabled(Feature::LayoutMutation));
        assert_eq!(monitor.healthy_services(), vec![INFERENCE, EMBEDDING]);
        assert!(!monitor.is_healthy("unknown"));
    }

    #[tokio::test]
    async fn test_start_stop_monitoring() {
        let prober = Arc::new(ScriptedProber::default());
        prober.push("http://inference.test/api/tags", ok(3));
        let monitor = Arc::new(monitor(Arc::clone(&prober), true));
        let mut summaries = monitor.subscribe_summaries();

        monitor.start_monitoring();
        monitor.start_monitoring();
        assert!(monitor.is_monitoring());

        let summary = tokio::time::timeout(Duration::from_secs(5), summaries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.healthy, 1);

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
    }
}
