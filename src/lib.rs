//! localai-router - Adaptive AI capability routing
//!
//! Detects which AI services are available on the local machine, keeps their
//! health current, and routes requests to them with a deterministic fallback
//! for every request kind. A snapshot engine keeps a bounded, deduplicated
//! history of runtime state for recovery.
//!
//! # Architecture
//!
//! - **capability**: one-shot discovery of local services and host resources
//! - **health**: periodic probing with status-change events
//! - **inference**: local text generation with model selection and streaming
//! - **router**: local-first dispatch with fallbacks
//! - **snapshot**: content-hashed state backups with retention

pub mod capability;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod errors;
pub mod health;
pub mod inference;
pub mod logging;
pub mod router;
pub mod snapshot;
pub mod telemetry;

// Re-export commonly used types
pub use context::AppContext;
pub use errors::{Result, RouterError};
