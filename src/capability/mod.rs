//! Local AI capability detection
//!
//! - Probing the inference server, vector store and embedding server
//! - Host memory, cores and accelerator markers
//! - TTL-cached, immutable snapshots

pub mod detector;
pub mod resources;
pub mod types;

pub use detector::CapabilityDetector;
pub use resources::{HostResources, ResourceProbe, StaticResources};
pub use types::{CapabilitySnapshot, DeploymentProfile};
