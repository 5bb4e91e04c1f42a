//! Health records, probe outcomes and monitor events

use crate::config::ServicesConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INFERENCE: &str = "inference";
pub const VECTOR_STORE: &str = "vector-store";
pub const EMBEDDING: &str = "embedding";

/// Health status of one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Offline,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A service the monitor polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub base_url: String,
    pub health_path: String,
}

impl ServiceSpec {
    pub fn new(name: &str, base_url: &str, health_path: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            health_path: health_path.to_string(),
        }
    }

    /// Full probe URL
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }

    /// Inference server, vector store and embedding server
    pub fn defaults(services: &ServicesConfig) -> Vec<ServiceSpec> {
        vec![
            ServiceSpec::new(INFERENCE, &services.inference_url, "/api/tags"),
            ServiceSpec::new(VECTOR_STORE, &services.vector_store_url, "/health"),
            ServiceSpec::new(EMBEDDING, &services.embedding_url, "/health"),
        ]
    }
}

/// Last known health of one service, replaced wholesale on every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    pub name: String,
    pub endpoint_url: String,
    pub status: HealthStatus,
    pub last_checked_at: DateTime<Utc>,
    pub last_response_time_ms: u64,
    pub last_error: Option<String>,
}

impl ServiceHealthRecord {
    /// Initial record before any probe
    pub fn offline(spec: &ServiceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            endpoint_url: spec.base_url.clone(),
            status: HealthStatus::Offline,
            last_checked_at: Utc::now(),
            last_response_time_ms: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailureKind {
    Timeout,
    Connection,
}

/// What a single probe observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Got an HTTP response within the timeout
    Reachable { status_code: u16, elapsed_ms: u64 },

    /// No response
    Failed {
        kind: ProbeFailureKind,
        message: String,
        elapsed_ms: u64,
    },
}

impl ProbeOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        match self {
            ProbeOutcome::Reachable { elapsed_ms, .. } | ProbeOutcome::Failed { elapsed_ms, .. } => {
                *elapsed_ms
            }
        }
    }
}

/// Status implied by a probe outcome, independent of the prior status
///
/// Error statuses (>= 400) mean degraded from any state, including offline.
pub fn status_for(outcome: &ProbeOutcome) -> HealthStatus {
    match outcome {
        ProbeOutcome::Reachable { status_code, .. } if *status_code < 400 => HealthStatus::Healthy,
        ProbeOutcome::Reachable { .. } => HealthStatus::Degraded,
        ProbeOutcome::Failed { .. } => HealthStatus::Offline,
    }
}

/// Emitted exactly once per status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub service: String,
    pub old_status: HealthStatus,
    pub new_status: HealthStatus,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Emitted after every completed poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub total: usize,
    pub percentage: f64,
}

impl HealthSummary {
    pub fn new(healthy: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            healthy as f64 * 100.0 / total as f64
        };
        Self {
            healthy,
            total,
            percentage,
        }
    }
}

/// Features gated on a combination of healthy services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    VectorSearch,
    SemanticIntelligence,
    LayoutMutation,
}

impl Feature {
    pub fn required_services(&self) -> &'static [&'static str] {
        match self {
            Feature::VectorSearch => &[VECTOR_STORE, EMBEDDING],
            Feature::SemanticIntelligence => &[INFERENCE, EMBEDDING],
            Feature::LayoutMutation => &[INFERENCE, VECTOR_STORE],
        }
    }
}
