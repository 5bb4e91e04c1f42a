//! Application context
//!
//! Builds every component from one `Config`, wires them together and owns
//! their background tasks. Nothing here is global; hosts construct as many
//! contexts as they need.

use crate::capability::CapabilityDetector;
use crate::collaborators::{HttpEmbeddingClient, HttpVectorStoreClient, TextGenerator};
use crate::config::Config;
use crate::errors::Result;
use crate::health::{ServiceHealthMonitor, ServiceSpec};
use crate::inference::LocalInferenceClient;
use crate::router::{Backends, RequestRouter};
use crate::snapshot::{SnapshotEngine, SnapshotScheduler, StateSource};
use crate::telemetry::TelemetryCollector;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::info;

pub struct AppContext {
    pub config: Config,
    pub detector: Arc<CapabilityDetector>,
    pub monitor: Arc<ServiceHealthMonitor>,
    pub inference: Arc<LocalInferenceClient>,
    pub router: Arc<RequestRouter>,
    pub snapshots: Arc<SnapshotEngine>,
    pub scheduler: Arc<SnapshotScheduler>,
    pub telemetry: TelemetryCollector,
    telemetry_task: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Construct all components; no network calls are made here
    pub fn build(config: Config) -> Result<Self> {
        let services = &config.services;
        let telemetry = TelemetryCollector::new();

        let detector = Arc::new(CapabilityDetector::new(services, &config.detector)?);
        let monitor = Arc::new(ServiceHealthMonitor::with_http_prober(
            ServiceSpec::defaults(services),
            Arc::clone(&detector),
            &config.monitor,
        )?);
        let inference = Arc::new(LocalInferenceClient::new(
            &services.inference_url,
            &config.inference,
        )?);

        let backends = Backends {
            generator: Arc::clone(&inference) as Arc<dyn TextGenerator>,
            embedder: Arc::new(HttpEmbeddingClient::new(
                &services.embedding_url,
                &config.collaborators,
            )?),
            vectors: Arc::new(HttpVectorStoreClient::new(
                &services.vector_store_url,
                &config.collaborators,
            )?),
        };
        let router = Arc::new(
            RequestRouter::new(
                Arc::clone(&detector),
                Arc::clone(&monitor),
                backends,
                &config.collaborators,
            )
            .with_telemetry(telemetry.clone()),
        );

        let snapshots = Arc::new(SnapshotEngine::open_dir(
            config.snapshot_dir(),
            config.snapshot.max_backup_files,
        )?);
        let source = Arc::new(RuntimeStateSource {
            detector: Arc::clone(&detector),
            monitor: Arc::clone(&monitor),
        });
        let scheduler = Arc::new(
            SnapshotScheduler::new(Arc::clone(&snapshots), source, config.snapshot.interval())
                .with_telemetry(telemetry.clone()),
        );

        Ok(Self {
            config,
            detector,
            monitor,
            inference,
            router,
            snapshots,
            scheduler,
            telemetry,
            telemetry_task: Mutex::new(None),
        })
    }

    /// Detect capabilities, seed the model registry and one health cycle
    ///
    /// Enough for one-shot commands; `start` adds the periodic tasks.
    pub async fn warm_up(&self) {
        let capabilities = self.detector.detect().await;
        self.inference
            .replace_models(capabilities.local_model_names.clone())
            .await;
        self.monitor.poll_once().await;
    }

    /// Start health polling, model refresh and snapshot scheduling
    pub async fn start(&self) {
        let capabilities = self.detector.detect().await;
        self.inference
            .replace_models(capabilities.local_model_names.clone())
            .await;

        {
            let mut task = self
                .telemetry_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if task.is_none() {
                *task = Some(self.telemetry.attach_monitor(&self.monitor));
            }
        }

        self.monitor.start_monitoring();
        self.inference.start_model_refresh();
        self.scheduler.start();

        info!(
            local = capabilities.is_local_deployment,
            models = capabilities.local_model_names.len(),
            "Router started"
        );
    }

    /// Stop every background task; safe to call more than once
    pub fn shutdown(&self) {
        self.scheduler.stop();
        self.inference.stop_model_refresh();
        self.monitor.stop_monitoring();

        let task = self
            .telemetry_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        info!("Router stopped");
    }

    /// State the scheduler would capture right now
    pub async fn runtime_state(&self) -> Result<Value> {
        RuntimeStateSource {
            detector: Arc::clone(&self.detector),
            monitor: Arc::clone(&self.monitor),
        }
        .current_state()
        .await
    }
}

/// Snapshot state made of detected capabilities and service statuses
///
/// Timestamps are left out so that an unchanged system hashes the same.
pub struct RuntimeStateSource {
    pub detector: Arc<CapabilityDetector>,
    pub monitor: Arc<ServiceHealthMonitor>,
}

#[async_trait]
impl StateSource for RuntimeStateSource {
    async fn current_state(&self) -> Result<Value> {
        let capabilities = self.detector.detect().await;

        let services: Vec<Value> = self
            .monitor
            .records()
            .into_iter()
            .map(|record| {
                json!({
                    "name": record.name,
                    "endpoint": record.endpoint_url,
                    "status": record.status,
                })
            })
            .collect();

        Ok(json!({
            "capabilities": {
                "hasAcceleratedCompute": capabilities.has_accelerated_compute,
                "hasLocalInferenceServer": capabilities.has_local_inference_server,
                "hasVectorStore": capabilities.has_vector_store,
                "hasEmbeddingServer": capabilities.has_embedding_server,
                "localModelNames": capabilities.local_model_names,
                "memoryGb": capabilities.memory_gb,
                "cpuCores": capabilities.cpu_cores,
                "isLocalDeployment": capabilities.is_local_deployment,
            },
            "services": services,
        }))
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        let task = self
            .telemetry_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.services.inference_url = "http://127.0.0.1:1".to_string();
        config.services.vector_store_url = "http://127.0.0.1:1".to_string();
        config.services.embedding_url = "http://127.0.0.1:1".to_string();
        config.snapshot.dir = dir.path().to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn test_build_and_runtime_state() {
        let dir = TempDir::new().unwrap();
        let context = AppContext::build(offline_config(&dir)).unwrap();

        let state = context.runtime_state().await.unwrap();
        assert_eq!(state["capabilities"]["hasLocalInferenceServer"], false);
        assert_eq!(state["services"].as_array().unwrap().len(), 3);
        assert_eq!(state["services"][0]["status"], "offline");
    }

    #[tokio::test]
    async fn test_runtime_state_is_stable() {
        let dir = TempDir::new().unwrap();
        let context = AppContext::build(offline_config(&dir)).unwrap();

        let first = context.runtime_state().await.unwrap();
        let second = context.runtime_state().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let context = AppContext::build(offline_config(&dir)).unwrap();

        context.start().await;
        assert!(context.monitor.is_monitoring());

        context.shutdown();
        context.shutdown();
        assert!(!context.monitor.is_monitoring());
    }
}
