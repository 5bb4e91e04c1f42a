//! Embedding server client (`POST /embed`)

use crate::collaborators::{EmbeddingBackend, Embeddings};
use crate::config::CollaboratorsConfig;
use crate::errors::{Result, RouterError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    model: Option<String>,
}

pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    default_model: String,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: &str, config: &CollaboratorsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(RouterError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn embed(
        &self,
        texts: &[String],
        model: Option<&str>,
        normalize: bool,
    ) -> Result<Embeddings> {
        let model = model.unwrap_or(&self.default_model);
        // A single text goes over the wire as a plain string
        let text = match texts {
            [single] => json!(single),
            many => json!(many),
        };

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&json!({ "text": text, "model": model, "normalize": normalize }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RouterError::ServiceUnhealthy {
                service: "embedding".to_string(),
                status_code: response.status().as_u16(),
            });
        }

        let body: EmbedResponse = response.json().await?;
        let dimensions = body.embeddings.first().map(Vec::len).unwrap_or(0);

        Ok(Embeddings {
            embeddings: body.embeddings,
            model: body.model.unwrap_or_else(|| model.to_string()),
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_single_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(json!({
                "text": "hello",
                "model": "all-MiniLM-L6-v2",
                "normalize": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.1, 0.2, 0.3]]
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(&server.uri(), &CollaboratorsConfig::default()).unwrap();
        let result = client.embed(&["hello".to_string()], None, true).await.unwrap();

        assert_eq!(result.embeddings.len(), 1);
        assert_eq!(result.dimensions, 3);
        assert_eq!(result.model, "all-MiniLM-L6-v2");
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(json!({"text": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 0.0], [0.0, 1.0]],
                "model": "bge-small"
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(&server.uri(), &CollaboratorsConfig::default()).unwrap();
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = client.embed(&texts, Some("bge-small"), false).await.unwrap();

        assert_eq!(result.embeddings.len(), 2);
        assert_eq!(result.model, "bge-small");
    }

    #[tokio::test]
    async fn test_embed_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(&server.uri(), &CollaboratorsConfig::default()).unwrap();
        let err = client.embed(&["x".to_string()], None, true).await.unwrap_err();
        assert!(matches!(err, RouterError::ServiceUnhealthy { status_code: 500, .. }));
    }
}
