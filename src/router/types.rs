//! Request and response envelope types

use crate::health::types::{EMBEDDING, INFERENCE, VECTOR_STORE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of AI work a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    Embedding,
    Generation,
    VectorSearch,
    SemanticAnalysis,
}

impl RequestKind {
    /// Services that must all be healthy for the local path
    pub fn required_services(&self) -> &'static [&'static str] {
        match self {
            RequestKind::Generation => &[INFERENCE],
            RequestKind::Embedding => &[EMBEDDING],
            RequestKind::VectorSearch => &[VECTOR_STORE, EMBEDDING],
            RequestKind::SemanticAnalysis => &[INFERENCE, EMBEDDING],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Embedding => "embedding",
            RequestKind::Generation => "generation",
            RequestKind::VectorSearch => "vector-search",
            RequestKind::SemanticAnalysis => "semantic-analysis",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedding" => Ok(RequestKind::Embedding),
            "generation" | "llm" => Ok(RequestKind::Generation),
            "vector-search" => Ok(RequestKind::VectorSearch),
            "semantic-analysis" => Ok(RequestKind::SemanticAnalysis),
            other => Err(format!("Unknown request kind: {}", other)),
        }
    }
}

/// Text or batch of texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestInput {
    Text(String),
    Batch(Vec<String>),
}

impl RequestInput {
    pub fn texts(&self) -> Vec<String> {
        match self {
            RequestInput::Text(text) => vec![text.clone()],
            RequestInput::Batch(texts) => texts.clone(),
        }
    }

    /// Single-string view; batches are joined with newlines
    pub fn joined(&self) -> String {
        match self {
            RequestInput::Text(text) => text.clone(),
            RequestInput::Batch(texts) => texts.join("\n"),
        }
    }
}

impl From<&str> for RequestInput {
    fn from(text: &str) -> Self {
        RequestInput::Text(text.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(text: String) -> Self {
        RequestInput::Text(text)
    }
}

impl From<Vec<String>> for RequestInput {
    fn from(texts: Vec<String>) -> Self {
        RequestInput::Batch(texts)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A typed AI request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub kind: RequestKind,
    pub input: RequestInput,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub priority: Priority,
}

impl AiRequest {
    pub fn new(kind: RequestKind, input: impl Into<RequestInput>) -> Self {
        Self {
            kind,
            input: input.into(),
            options: Map::new(),
            priority: Priority::default(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_usize(&self, key: &str) -> Option<usize> {
        self.options
            .get(key)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Local,
    Fallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Local => write!(f, "local"),
            Provenance::Fallback => write!(f, "fallback"),
        }
    }
}

/// Uniform response envelope, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    provenance: Provenance,
    processing_time_ms: u64,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl AiResponse {
    pub fn local(payload: Value, processing_time_ms: u64, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_message: None,
            provenance: Provenance::Local,
            processing_time_ms,
            metadata,
        }
    }

    pub fn fallback(payload: Value, processing_time_ms: u64, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_message: None,
            provenance: Provenance::Fallback,
            processing_time_ms,
            metadata,
        }
    }

    /// Fallback that could not produce an answer
    pub fn failed(message: String, processing_time_ms: u64, metadata: Map<String, Value>) -> Self {
        Self {
            success: false,
            payload: None,
            error_message: Some(message),
            provenance: Provenance::Fallback,
            processing_time_ms,
            metadata,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_services() {
        assert_eq!(RequestKind::Generation.required_services(), &[INFERENCE]);
        assert_eq!(
            RequestKind::VectorSearch.required_services(),
            &[VECTOR_STORE, EMBEDDING]
        );
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("llm".parse::<RequestKind>().unwrap(), RequestKind::Generation);
        assert_eq!(
            "semantic-analysis".parse::<RequestKind>().unwrap(),
            RequestKind::SemanticAnalysis
        );
        assert!("translate".parse::<RequestKind>().is_err());
    }

    #[test]
    fn test_request_deserializes_untagged_input() {
        let request: AiRequest = serde_json::from_value(json!({
            "kind": "embedding",
            "input": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(request.input, RequestInput::Batch(vec!["a".into(), "b".into()]));
        assert_eq!(request.priority, Priority::Medium);
        assert!(request.options.is_empty());
    }

    #[test]
    fn test_response_json_shape() {
        let ok = AiResponse::fallback(json!({"text": "hi"}), 3, Map::new());
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["provenance"], "fallback");
        assert_eq!(value["processingTimeMs"], 3);
        assert!(value.get("error").is_none());

        let failed = AiResponse::failed("bad input".to_string(), 1, Map::new());
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "bad input");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_request_builders() {
        let request = AiRequest::new(RequestKind::VectorSearch, "rust async")
            .with_option("collection", "docs")
            .with_option("limit", 3)
            .with_priority(Priority::High);
        assert_eq!(request.option_str("collection"), Some("docs"));
        assert_eq!(request.option_usize("limit"), Some(3));
        assert_eq!(request.option_bool("normalize"), None);
        assert_eq!(request.input.joined(), "rust async");
    }
}
