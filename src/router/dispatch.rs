//! Request router
//!
//! Sends each request to a local backend when the deployment is local and
//! every service the request needs is healthy; otherwise, or when the local
//! attempt fails, answers from the deterministic fallback. Never returns an
//! error to its caller.

use crate::capability::CapabilityDetector;
use crate::collaborators::{EmbeddingBackend, TextGenerator, VectorSearchBackend};
use crate::config::CollaboratorsConfig;
use crate::errors::{Result, RouterError};
use crate::health::ServiceHealthMonitor;
use crate::inference::GenerationOptions;
use crate::router::fallback;
use crate::router::types::{AiRequest, AiResponse, RequestKind};
use crate::telemetry::TelemetryCollector;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Token cap for the generation half of a local semantic analysis
const ANALYSIS_MAX_TOKENS: u32 = 500;

/// The local backends a router can delegate to
#[derive(Clone)]
pub struct Backends {
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub vectors: Arc<dyn VectorSearchBackend>,
}

pub struct RequestRouter {
    detector: Arc<CapabilityDetector>,
    monitor: Arc<ServiceHealthMonitor>,
    backends: Backends,
    default_collection: String,
    search_limit: usize,
    telemetry: Option<TelemetryCollector>,
}

impl RequestRouter {
    pub fn new(
        detector: Arc<CapabilityDetector>,
        monitor: Arc<ServiceHealthMonitor>,
        backends: Backends,
        config: &CollaboratorsConfig,
    ) -> Self {
        Self {
            detector,
            monitor,
            backends,
            default_collection: config.default_collection.clone(),
            search_limit: config.search_limit,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Whether a request of `kind` would currently take the local path
    ///
    /// Reads the last detected capabilities without probing; until a
    /// detection has run the deployment counts as not local.
    pub async fn can_process_locally(&self, kind: RequestKind) -> bool {
        let is_local = self
            .detector
            .cached()
            .await
            .is_some_and(|snapshot| snapshot.is_local_deployment);
        is_local && self.monitor.all_healthy(kind.required_services())
    }

    /// Route one request
    pub async fn process(&self, request: AiRequest) -> AiResponse {
        self.route(request, None).await
    }

    /// Route one request, streaming local generation through `on_chunk`
    ///
    /// Falls back exactly like `process`. Fallback text is returned in the
    /// response only, and fragments delivered before a local failure stand.
    pub async fn process_stream(
        &self,
        request: AiRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> AiResponse {
        self.route(request, Some(on_chunk)).await
    }

    async fn route(
        &self,
        request: AiRequest,
        on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> AiResponse {
        let started = Instant::now();
        let mut metadata = Map::new();
        metadata.insert("requestId".to_string(), json!(Uuid::new_v4().to_string()));
        metadata.insert("kind".to_string(), json!(request.kind.as_str()));

        let response = if self.can_process_locally(request.kind).await {
            match self.run_local(&request, on_chunk).await {
                Ok((payload, extra)) => {
                    metadata.extend(extra);
                    AiResponse::local(payload, elapsed_ms(started), metadata)
                }
                Err(e) => {
                    warn!(kind = %request.kind, error = %e, "Local processing failed, using fallback");
                    metadata.insert("localError".to_string(), json!(e.to_string()));
                    metadata.insert("fallbackReason".to_string(), json!("local_error"));
                    run_fallback(&request, started, metadata)
                }
            }
        } else {
            metadata.insert("fallbackReason".to_string(), json!("local_unavailable"));
            run_fallback(&request, started, metadata)
        };

        debug!(
            kind = %request.kind,
            provenance = %response.provenance(),
            success = response.success(),
            processing_time_ms = response.processing_time_ms(),
            "Request routed"
        );

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_request(
                request.kind,
                response.provenance(),
                response.success(),
                response.processing_time_ms(),
            );
        }

        response
    }

    async fn run_local(
        &self,
        request: &AiRequest,
        on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<(Value, Map<String, Value>)> {
        match request.kind {
            RequestKind::Generation => self.local_generation(request, on_chunk).await,
            RequestKind::Embedding => self.local_embedding(request).await,
            RequestKind::VectorSearch => self.local_search(request).await,
            RequestKind::SemanticAnalysis => self.local_analysis(request).await,
        }
    }

    async fn local_generation(
        &self,
        request: &AiRequest,
        on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<(Value, Map<String, Value>)> {
        let generator = &self.backends.generator;
        let options =
            GenerationOptions::from_request_options(&request.options, &generator.default_options());
        let prompt = request.input.joined();
        let hint = request.option_str("model");

        let generation = match on_chunk {
            Some(on_chunk) => generator.generate_stream(&prompt, hint, &options, on_chunk).await?,
            None => generator.generate(&prompt, hint, &options).await?,
        };

        let metadata = meta(&[("service", json!("inference")), ("model", json!(&generation.model))]);
        Ok((serde_json::to_value(&generation)?, metadata))
    }

    async fn local_embedding(&self, request: &AiRequest) -> Result<(Value, Map<String, Value>)> {
        let normalize = request.option_bool("normalize").unwrap_or(true);
        let embeddings = self
            .backends
            .embedder
            .embed(&request.input.texts(), request.option_str("model"), normalize)
            .await?;

        let metadata = meta(&[("service", json!("embedding")), ("model", json!(&embeddings.model))]);
        Ok((serde_json::to_value(&embeddings)?, metadata))
    }

    async fn local_search(&self, request: &AiRequest) -> Result<(Value, Map<String, Value>)> {
        let query = request.input.joined();
        let collection = request
            .option_str("collection")
            .unwrap_or(&self.default_collection)
            .to_string();
        let limit = request.option_usize("limit").unwrap_or(self.search_limit);

        let embedded = self
            .backends
            .embedder
            .embed(std::slice::from_ref(&query), None, true)
            .await?;
        let vector = embedded
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RouterError::InvalidResponse {
                service: "embedding".to_string(),
                reason: "no vector returned for query".to_string(),
            })?;

        let hits = self.backends.vectors.search(&collection, &vector, limit).await?;

        let payload = json!({ "results": hits, "query": query, "collection": &collection });
        let metadata = meta(&[("service", json!("vector-store")), ("collection", json!(collection))]);
        Ok((payload, metadata))
    }

    async fn local_analysis(&self, request: &AiRequest) -> Result<(Value, Map<String, Value>)> {
        let text = request.input.joined();
        let prompt = format!("Analyze the semantic meaning of this text: \"{}\"", text);
        let options = GenerationOptions {
            max_tokens: ANALYSIS_MAX_TOKENS,
            ..self.backends.generator.default_options()
        };
        let texts = [text];

        let (generation, embeddings) = tokio::join!(
            self.backends.generator.generate(&prompt, None, &options),
            self.backends.embedder.embed(&texts, None, true),
        );
        let (generation, embeddings) = (generation?, embeddings?);

        let payload = json!({
            "semantic_analysis": generation.text,
            "embeddings": embeddings.embeddings,
            "model": generation.model,
            "confidence": 0.95,
            "method": "local_ai",
        });
        let metadata = meta(&[
            ("services", json!(["inference", "embedding"])),
            ("analysisType", json!("full_semantic")),
        ]);
        Ok((payload, metadata))
    }
}

fn run_fallback(request: &AiRequest, started: Instant, mut metadata: Map<String, Value>) -> AiResponse {
    let outcome = fallback::run(request);
    metadata.insert("method".to_string(), json!(outcome.method));

    match outcome.result {
        Ok(payload) => AiResponse::fallback(payload, elapsed_ms(started), metadata),
        Err(message) => AiResponse::failed(message, elapsed_ms(started), metadata),
    }
}

fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
