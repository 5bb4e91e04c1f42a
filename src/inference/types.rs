//! Wire and result types for the local generation backend

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Response from the backend's `/api/tags` model listing
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

/// One installed model
#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,

    /// Model size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub digest: Option<String>,
}

impl TagsResponse {
    /// Names in listing order
    pub fn model_names(self) -> Vec<String> {
        self.models.into_iter().map(|m| m.name).collect()
    }
}

/// Sampling options for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            stop: Vec::new(),
        }
    }
}

impl GenerationOptions {
    /// Read `temperature`, `maxTokens` and `stop` from request options,
    /// keeping `defaults` for anything absent or of the wrong type
    pub fn from_request_options(options: &Map<String, Value>, defaults: &GenerationOptions) -> Self {
        let temperature = options
            .get("temperature")
            .and_then(Value::as_f64)
            .map(|t| t as f32)
            .unwrap_or(defaults.temperature);

        let max_tokens = options
            .get("maxTokens")
            .or_else(|| options.get("max_tokens"))
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(defaults.max_tokens);

        let stop = options
            .get("stop")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| defaults.stop.clone());

        Self {
            temperature,
            max_tokens,
            stop,
        }
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
        }
    }
}

/// Result of one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub text: String,
    pub model: String,
    /// Backend-reported count when available, otherwise an estimate
    pub tokens_used: u64,
    pub processing_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Body of POST /api/generate
#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: BackendOptions<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BackendOptions<'a> {
    pub temperature: f32,
    pub num_predict: u32,
    pub stop: &'a [String],
}

/// One line of a generate response (the whole body when not streaming)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl GenerateChunk {
    pub fn finish_reason(&self) -> FinishReason {
        match self.done_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ if self.done => FinishReason::Stop,
            _ => FinishReason::Length,
        }
    }

    /// Exact token count when the backend reported both sides
    pub fn reported_tokens(&self) -> Option<u64> {
        match (self.prompt_eval_count, self.eval_count) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        }
    }
}
