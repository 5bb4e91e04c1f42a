//! Vector store client over the REST search endpoint

use crate::collaborators::{SearchHit, VectorSearchBackend};
use crate::config::CollaboratorsConfig;
use crate::errors::{Result, RouterError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

pub struct HttpVectorStoreClient {
    client: Client,
    base_url: String,
}

impl HttpVectorStoreClient {
    pub fn new(base_url: &str, config: &CollaboratorsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(RouterError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VectorSearchBackend for HttpVectorStoreClient {
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/collections/{}/points/search", self.base_url, collection);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "vector": vector, "limit": limit, "with_payload": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RouterError::ServiceUnhealthy {
                service: "vector-store".to_string(),
                status_code: response.status().as_u16(),
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/search"))
            .and(body_partial_json(json!({"limit": 2, "with_payload": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": 7, "score": 0.91, "payload": {"title": "intro"}},
                    {"id": "b2", "score": 0.5}
                ],
                "status": "ok",
                "time": 0.001
            })))
            .mount(&server)
            .await;

        let client = HttpVectorStoreClient::new(&server.uri(), &CollaboratorsConfig::default()).unwrap();
        let hits = client.search("docs", &[0.1, 0.2], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, json!(7));
        assert!(hits[1].payload.is_none());
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpVectorStoreClient::new(&server.uri(), &CollaboratorsConfig::default()).unwrap();
        let err = client.search("missing", &[0.0], 5).await.unwrap_err();
        assert!(matches!(err, RouterError::ServiceUnhealthy { status_code: 404, .. }));
    }
}
