//! Local backends the request router delegates to
//!
//! Each backend sits behind a trait so the router can be exercised without
//! live services.

pub mod embedding;
pub mod vector;

use crate::errors::Result;
use crate::inference::{Generation, GenerationOptions, LocalInferenceClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use embedding::HttpEmbeddingClient;
pub use vector::HttpVectorStoreClient;

/// Text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model_hint: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<Generation>;

    /// Generation with fragments handed to `on_chunk` in order
    ///
    /// Backends without streaming deliver the whole text as one fragment.
    async fn generate_stream(
        &self,
        prompt: &str,
        model_hint: Option<&str>,
        options: &GenerationOptions,
        on_chunk: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Generation> {
        let generation = self.generate(prompt, model_hint, options).await?;
        on_chunk(&generation.text);
        Ok(generation)
    }

    /// Options used when a request carries none
    fn default_options(&self) -> GenerationOptions;
}

#[async_trait]
impl TextGenerator for LocalInferenceClient {
    async fn generate(
        &self,
        prompt: &str,
        model_hint: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<Generation> {
        LocalInferenceClient::generate(self, prompt, model_hint, options).await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        model_hint: Option<&str>,
        options: &GenerationOptions,
        on_chunk: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Generation> {
        LocalInferenceClient::generate_stream(self, prompt, model_hint, options, |text: &str| {
            on_chunk(text)
        })
        .await
    }

    fn default_options(&self) -> GenerationOptions {
        LocalInferenceClient::default_options(self).clone()
    }
}

/// Vectors for a batch of texts, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embeddings {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
}

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, texts: &[String], model: Option<&str>, normalize: bool)
        -> Result<Embeddings>;
}

/// One nearest-neighbour match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}
