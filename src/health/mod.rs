//! Service health monitoring
//!
//! Healthy / degraded / offline tracking for the local inference server,
//! vector store and embedding server.

pub mod monitor;
pub mod prober;
pub mod types;

pub use monitor::ServiceHealthMonitor;
pub use prober::{HealthProber, HttpProber};
pub use types::{
    Feature, HealthStatus, HealthSummary, ProbeFailureKind, ProbeOutcome, ServiceHealthRecord,
    ServiceSpec, StatusTransition, EMBEDDING, INFERENCE, VECTOR_STORE,
};
