//! Local model inference
//!
//! Registry of installed models, keyword-based model selection, and blocking
//! or streamed generation against the local backend.

pub mod client;
pub mod selection;
pub mod stream;
pub mod types;

pub use client::LocalInferenceClient;
pub use selection::{
    classify, estimate_tokens, is_complex_reasoning, select_model, ModelPriorities, PromptCategory,
};
pub use types::{FinishReason, Generation, GenerationOptions};
