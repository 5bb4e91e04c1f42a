//! Capability snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum memory for an accelerator box to count as local-capable
pub const MIN_LOCAL_MEMORY_GB: f64 = 4.0;

/// Minimum cores for an accelerator box to count as local-capable
pub const MIN_LOCAL_CPU_CORES: usize = 4;

/// Point-in-time record of which local AI resources are reachable
///
/// Never mutated after capture; a refresh produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub has_accelerated_compute: bool,
    pub has_local_inference_server: bool,
    pub has_vector_store: bool,
    pub has_embedding_server: bool,
    /// Model names in the order the inference server listed them
    pub local_model_names: Vec<String>,
    pub memory_gb: f64,
    pub cpu_cores: usize,
    pub is_local_deployment: bool,
    pub captured_at: DateTime<Utc>,
}

impl CapabilitySnapshot {
    /// Whether any local AI service answered its probe
    pub fn has_any_local_service(&self) -> bool {
        self.has_local_inference_server || self.has_vector_store || self.has_embedding_server
    }

    /// Tuning derived from what was detected
    pub fn deployment_profile(&self) -> DeploymentProfile {
        if !self.is_local_deployment {
            return DeploymentProfile::hosted();
        }

        DeploymentProfile {
            fallback_mode: false,
            vector_search_enabled: self.has_vector_store,
            semantic_intelligence_enabled: self.has_local_inference_server
                && self.has_embedding_server,
            layout_mutation_enabled: self.has_accelerated_compute
                && self.memory_gb >= MIN_LOCAL_MEMORY_GB,
            max_concurrent_requests: (self.cpu_cores * 2).clamp(1, 20),
        }
    }
}

/// Local-deployment decision
///
/// Any reachable local service, or an accelerator with enough memory and
/// cores, or an explicit override.
pub fn is_local_deployment(
    any_service_reachable: bool,
    has_accelerator: bool,
    memory_gb: f64,
    cpu_cores: usize,
    local_override: bool,
) -> bool {
    let has_good_resources =
        has_accelerator && memory_gb >= MIN_LOCAL_MEMORY_GB && cpu_cores >= MIN_LOCAL_CPU_CORES;
    any_service_reachable || has_good_resources || local_override
}

/// Feature switches for the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentProfile {
    pub fallback_mode: bool,
    pub vector_search_enabled: bool,
    pub semantic_intelligence_enabled: bool,
    pub layout_mutation_enabled: bool,
    pub max_concurrent_requests: usize,
}

impl DeploymentProfile {
    /// Profile for hosted/cloud deployments: everything on fallbacks
    pub fn hosted() -> Self {
        Self {
            fallback_mode: true,
            vector_search_enabled: false,
            semantic_intelligence_enabled: false,
            layout_mutation_enabled: false,
            max_concurrent_requests: 2,
        }
    }
}
