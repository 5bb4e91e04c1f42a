//! Capability detector
//!
//! Probes the local inference server, vector store, embedding server and host
//! resources once, then serves the cached snapshot until its TTL expires.

use crate::capability::resources::{HostResources, ResourceProbe};
use crate::capability::types::{is_local_deployment, CapabilitySnapshot, DeploymentProfile};
use crate::config::{DetectorConfig, ServicesConfig};
use crate::errors::{Result, RouterError};
use crate::inference::types::TagsResponse;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

struct CachedCapabilities {
    snapshot: Arc<CapabilitySnapshot>,
    fetched_at: Instant,
}

/// Cached detector of local AI capabilities
pub struct CapabilityDetector {
    client: Client,
    services: ServicesConfig,
    resources: Arc<dyn ResourceProbe>,
    ttl: Duration,
    local_override: bool,
    cache: RwLock<Option<CachedCapabilities>>,
    refresh: Mutex<()>,
}

impl CapabilityDetector {
    /// Create a detector that introspects the real host
    pub fn new(services: &ServicesConfig, config: &DetectorConfig) -> Result<Self> {
        Self::with_resources(services, config, Arc::new(HostResources))
    }

    /// Create a detector with a custom resource probe
    pub fn with_resources(
        services: &ServicesConfig,
        config: &DetectorConfig,
        resources: Arc<dyn ResourceProbe>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(RouterError::Http)?;

        Ok(Self {
            client,
            services: services.clone(),
            resources,
            ttl: config.cache_ttl(),
            local_override: config.local_override,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    /// Current capabilities, probing only when the cache is empty or stale
    pub async fn detect(&self) -> Arc<CapabilitySnapshot> {
        if let Some(snapshot) = self.fresh().await {
            return snapshot;
        }

        // One refresh at a time; latecomers reuse its result
        let _guard = self.refresh.lock().await;
        if let Some(snapshot) = self.fresh().await {
            return snapshot;
        }

        let snapshot = Arc::new(self.probe().await);
        *self.cache.write().await = Some(CachedCapabilities {
            snapshot: Arc::clone(&snapshot),
            fetched_at: Instant::now(),
        });

        info!(
            accelerated = snapshot.has_accelerated_compute,
            inference = snapshot.has_local_inference_server,
            vector_store = snapshot.has_vector_store,
            embedding = snapshot.has_embedding_server,
            models = snapshot.local_model_names.len(),
            memory_gb = snapshot.memory_gb,
            local = snapshot.is_local_deployment,
            "Environment detection completed"
        );

        snapshot
    }

    /// Last captured snapshot regardless of age, without probing
    pub async fn cached(&self) -> Option<Arc<CapabilitySnapshot>> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Drop the cached snapshot so the next `detect` probes again
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// True until a detection has run, and whenever the deployment is not local
    pub async fn should_use_fallbacks(&self) -> bool {
        match self.cached().await {
            Some(snapshot) => !snapshot.is_local_deployment,
            None => true,
        }
    }

    /// Feature profile from the cached snapshot
    pub async fn deployment_profile(&self) -> DeploymentProfile {
        match self.cached().await {
            Some(snapshot) => snapshot.deployment_profile(),
            None => DeploymentProfile::hosted(),
        }
    }

    async fn fresh(&self) -> Option<Arc<CapabilitySnapshot>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    async fn probe(&self) -> CapabilitySnapshot {
        let vector_url = format!("{}/health", self.services.vector_store_url);
        let embedding_url = format!("{}/health", self.services.embedding_url);

        let (models, has_vector_store, has_embedding_server) = tokio::join!(
            self.probe_inference_server(),
            self.probe_health("vector store", &vector_url),
            self.probe_health("embedding server", &embedding_url),
        );

        let resources = Arc::clone(&self.resources);
        let (memory_gb, cpu_cores, has_accelerator) = tokio::task::spawn_blocking(move || {
            (
                resources.memory_gb(),
                resources.cpu_cores(),
                resources.has_accelerator(),
            )
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to detect system resources");
            (0.0, 0, false)
        });

        debug!(memory_gb, cpu_cores, has_accelerator, "System resources detected");

        let has_local_inference_server = models.is_some();
        let any_service = has_local_inference_server || has_vector_store || has_embedding_server;

        CapabilitySnapshot {
            has_accelerated_compute: has_accelerator,
            has_local_inference_server,
            has_vector_store,
            has_embedding_server,
            local_model_names: models.unwrap_or_default(),
            memory_gb,
            cpu_cores,
            is_local_deployment: is_local_deployment(
                any_service,
                has_accelerator,
                memory_gb,
                cpu_cores,
                self.local_override,
            ),
            captured_at: Utc::now(),
        }
    }

    /// Model names when the inference server answers its listing call
    async fn probe_inference_server(&self) -> Option<Vec<String>> {
        let url = format!("{}/api/tags", self.services.inference_url);

        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Inference server not available");
                return None;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Inference server not available");
                return None;
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => Some(tags.model_names()),
            Err(e) => {
                debug!(url = %url, error = %e, "Inference server returned an unreadable model list");
                None
            }
        }
    }

    async fn probe_health(&self, label: &str, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "{} detected", label);
                true
            }
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "{} not available", label);
                false
            }
            Err(e) => {
                debug!(url = %url, error = %e, "{} not available", label);
                false
            }
        }
    }
}
