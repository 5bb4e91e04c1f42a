//! AI request routing
//!
//! Local-preferred execution with a deterministic fallback for every kind.

pub mod dispatch;
pub mod fallback;
pub mod types;

pub use dispatch::{Backends, RequestRouter};
pub use types::{AiRequest, AiResponse, Priority, Provenance, RequestInput, RequestKind};
