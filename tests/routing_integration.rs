//! End-to-end routing against mocked local services
//!
//! Each test stands up wiremock servers for the inference, vector store and
//! embedding services and drives a full `AppContext` through them.

use localai_router::{
    config::Config,
    router::{AiRequest, Provenance, RequestKind},
    AppContext,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Services {
    inference: MockServer,
    vectors: MockServer,
    embedding: MockServer,
}

impl Services {
    async fn start() -> Self {
        Self {
            inference: MockServer::start().await,
            vectors: MockServer::start().await,
            embedding: MockServer::start().await,
        }
    }

    fn config(&self, dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.services.inference_url = self.inference.uri();
        config.services.vector_store_url = self.vectors.uri();
        config.services.embedding_url = self.embedding.uri();
        config.snapshot.dir = dir.path().to_string_lossy().to_string();
        config
    }
}

async fn mount_tags(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3:8b", "size": 4_661_224_676u64, "digest": "abc" }]
        })))
        .mount(server)
        .await;
}

async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mount_embed(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3]],
            "model": "bge-small"
        })))
        .mount(server)
        .await;
}

async fn mount_generate(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3:8b",
            "response": "Hello there",
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 4,
            "eval_count": 3
        })))
        .mount(server)
        .await;
}

async fn all_healthy() -> Services {
    let services = Services::start().await;
    mount_tags(&services.inference).await;
    mount_generate(&services.inference).await;
    mount_health(&services.vectors, 200).await;
    mount_health(&services.embedding, 200).await;
    mount_embed(&services.embedding).await;
    services
}

#[tokio::test]
async fn test_generation_runs_locally() {
    let services = all_healthy().await;
    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    assert!(context.detector.detect().await.is_local_deployment);
    assert_eq!(context.inference.available_models().await, vec!["llama3:8b"]);

    let response = context
        .router
        .process(AiRequest::new(RequestKind::Generation, "Say hello"))
        .await;

    assert!(response.success());
    assert_eq!(response.provenance(), Provenance::Local);
    let payload = response.payload().unwrap();
    assert_eq!(payload["text"], "Hello there");
    assert_eq!(payload["model"], "llama3:8b");
    assert_eq!(payload["tokensUsed"], 7);
    assert_eq!(response.metadata()["model"], "llama3:8b");
}

#[tokio::test]
async fn test_embedding_and_search_run_locally() {
    let services = all_healthy().await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{ "id": 7, "score": 0.92, "payload": { "title": "Routing" } }]
        })))
        .mount(&services.vectors)
        .await;

    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    let embedded = context
        .router
        .process(AiRequest::new(RequestKind::Embedding, "some text"))
        .await;
    assert_eq!(embedded.provenance(), Provenance::Local);
    assert_eq!(embedded.payload().unwrap()["dimensions"], 3);

    let searched = context
        .router
        .process(
            AiRequest::new(RequestKind::VectorSearch, "routing")
                .with_option("collection", "docs")
                .with_option("limit", 3),
        )
        .await;
    assert_eq!(searched.provenance(), Provenance::Local);
    let results = searched.payload().unwrap()["results"].as_array().unwrap().clone();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["payload"]["title"], "Routing");
}

#[tokio::test]
async fn test_degraded_service_falls_back() {
    let services = Services::start().await;
    mount_tags(&services.inference).await;
    mount_health(&services.vectors, 200).await;
    mount_health(&services.embedding, 503).await;

    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    assert!(!context.monitor.is_healthy("embedding"));
    assert!(context.monitor.is_healthy("inference"));

    let response = context
        .router
        .process(AiRequest::new(RequestKind::Embedding, "abc"))
        .await;

    assert!(response.success());
    assert_eq!(response.provenance(), Provenance::Fallback);
    assert_eq!(response.metadata()["fallbackReason"], "local_unavailable");
    let payload = response.payload().unwrap();
    assert_eq!(payload["dimensions"], 384);
    assert_eq!(payload["embeddings"][0].as_array().unwrap().len(), 384);
}

#[tokio::test]
async fn test_local_failure_falls_back() {
    let services = Services::start().await;
    mount_tags(&services.inference).await;
    mount_health(&services.vectors, 200).await;
    mount_health(&services.embedding, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("out of memory"))
        .mount(&services.inference)
        .await;

    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    let response = context
        .router
        .process(AiRequest::new(RequestKind::Generation, "hello"))
        .await;

    assert!(response.success());
    assert_eq!(response.provenance(), Provenance::Fallback);
    assert_eq!(response.metadata()["fallbackReason"], "local_error");
    assert!(response.metadata()["localError"]
        .as_str()
        .unwrap()
        .contains("out of memory"));
    assert_eq!(response.payload().unwrap()["model"], "rule_based");
}

#[tokio::test]
async fn test_telemetry_counts_routed_requests() {
    let services = all_healthy().await;
    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    context
        .router
        .process(AiRequest::new(RequestKind::Generation, "hi"))
        .await;
    context
        .router
        .process(AiRequest::new(RequestKind::VectorSearch, "no documents"))
        .await;

    let stats = context.telemetry.get_stats();
    assert_eq!(stats.requests_routed, 2);
    assert_eq!(stats.local_requests, 1);
}

#[tokio::test]
async fn test_truncated_stream_falls_back() {
    let services = Services::start().await;
    mount_tags(&services.inference).await;
    mount_health(&services.vectors, 200).await;
    mount_health(&services.embedding, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n"),
        )
        .mount(&services.inference)
        .await;

    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    let mut streamed = String::new();
    let response = context
        .router
        .process_stream(
            AiRequest::new(RequestKind::Generation, "hello"),
            &mut |text: &str| streamed.push_str(text),
        )
        .await;

    assert_eq!(streamed, "Hello");
    assert!(response.success());
    assert_eq!(response.provenance(), Provenance::Fallback);
    assert_eq!(response.metadata()["fallbackReason"], "local_error");
}

#[tokio::test]
async fn test_unknown_model_hint_falls_back_when_streaming() {
    let services = all_healthy().await;
    let dir = TempDir::new().unwrap();
    let context = AppContext::build(services.config(&dir)).unwrap();
    context.warm_up().await;

    let mut streamed = String::new();
    let response = context
        .router
        .process_stream(
            AiRequest::new(RequestKind::Generation, "hello").with_option("model", "not-installed:1b"),
            &mut |text: &str| streamed.push_str(text),
        )
        .await;

    assert!(streamed.is_empty());
    assert_eq!(response.provenance(), Provenance::Fallback);
    assert!(response.metadata()["localError"]
        .as_str()
        .unwrap()
        .contains("not-installed:1b"));
}
