//! Local inference client
//!
//! Keeps a registry of installed models, picks one per prompt and runs
//! generation against the local backend, blocking or streamed.

use crate::config::InferenceConfig;
use crate::errors::{Result, RouterError};
use crate::inference::selection::{estimate_tokens, select_model, ModelPriorities};
use crate::inference::stream::NdjsonBuffer;
use crate::inference::types::{
    BackendOptions, GenerateChunk, GenerateRequest, Generation, GenerationOptions, TagsResponse,
};
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Timeout for the model listing call
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Model downloads can be large
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Client for the local generation backend
pub struct LocalInferenceClient {
    client: Client,
    base_url: String,
    priorities: ModelPriorities,
    defaults: GenerationOptions,
    refresh_interval: Duration,
    registry: RwLock<Vec<String>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LocalInferenceClient {
    pub fn new(base_url: &str, config: &InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.generation_timeout())
            .build()
            .map_err(RouterError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            priorities: ModelPriorities::from_config(config),
            defaults: GenerationOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                stop: Vec::new(),
            },
            refresh_interval: config.model_refresh_interval(),
            registry: RwLock::new(Vec::new()),
            refresh_task: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Defaults applied when a request carries no sampling options
    pub fn default_options(&self) -> &GenerationOptions {
        &self.defaults
    }

    /// Registry contents at this moment
    pub async fn available_models(&self) -> Vec<String> {
        self.registry.read().await.clone()
    }

    pub async fn is_model_available(&self, name: &str) -> bool {
        self.registry.read().await.iter().any(|m| m == name)
    }

    /// Replace the registry wholesale
    pub async fn replace_models(&self, models: Vec<String>) {
        *self.registry.write().await = models;
    }

    /// Re-read the installed model list from the backend
    ///
    /// On failure the previous registry is kept.
    pub async fn refresh_models(&self) -> Result<usize> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).timeout(LIST_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(RouterError::ServiceUnhealthy {
                service: "inference".to_string(),
                status_code: response.status().as_u16(),
            });
        }

        let models = response.json::<TagsResponse>().await?.model_names();
        let count = models.len();
        self.replace_models(models).await;

        debug!(count, "Model registry refreshed");
        Ok(count)
    }

    /// Start periodic registry refresh; a second call is a no-op
    pub fn start_model_refresh(self: &Arc<Self>) {
        let mut slot = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.refresh_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = client.refresh_models().await {
                    warn!(error = %e, "Failed to refresh local models");
                }
            }
        }));

        info!(interval_secs = interval.as_secs(), "Model refresh started");
    }

    /// Stop periodic refresh; safe to call when not running
    pub fn stop_model_refresh(&self) {
        let task = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            info!("Model refresh stopped");
        }
    }

    /// Resolve the model for a prompt, honouring an explicit hint
    pub async fn choose_model(&self, prompt: &str, hint: Option<&str>) -> Result<String> {
        let models = self.registry.read().await;

        match hint {
            Some(requested) if models.iter().any(|m| m == requested) => Ok(requested.to_string()),
            Some(requested) => Err(RouterError::ModelNotInstalled {
                requested: requested.to_string(),
                available: models.join(", "),
            }),
            None => select_model(prompt, &models, &self.priorities),
        }
    }

    /// Run one generation and wait for the full answer
    pub async fn generate(
        &self,
        prompt: &str,
        hint: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<Generation> {
        let started = Instant::now();
        let model = self.choose_model(prompt, hint).await?;

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&generate_body(&model, prompt, options, false))
            .send()
            .await
            .map_err(inference_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RouterError::LocalInferenceFailure(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let chunk: GenerateChunk = response.json().await.map_err(inference_failure)?;
        if chunk.response.is_empty() {
            return Err(RouterError::LocalInferenceFailure(
                "Backend returned an empty response".to_string(),
            ));
        }

        let text = chunk.response.clone();
        Ok(finish(model, prompt, text, &chunk, started))
    }

    /// Run one generation, handing each text fragment to `on_chunk` in order
    ///
    /// Resolves once the backend marks the stream done. A stream that ends
    /// without that marker is a failure even if fragments were delivered.
    pub async fn generate_stream<F>(
        &self,
        prompt: &str,
        hint: Option<&str>,
        options: &GenerationOptions,
        mut on_chunk: F,
    ) -> Result<Generation>
    where
        F: FnMut(&str) + Send,
    {
        let started = Instant::now();
        let model = self.choose_model(prompt, hint).await?;

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&generate_body(&model, prompt, options, true))
            .send()
            .await
            .map_err(inference_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RouterError::LocalInferenceFailure(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = NdjsonBuffer::new();
        let mut text = String::new();

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(inference_failure)?;
            for chunk in buffer.push(&bytes)? {
                if let Some(last) = absorb(chunk, &mut text, &mut on_chunk) {
                    return Ok(finish(model, prompt, text, &last, started));
                }
            }
        }

        if let Some(chunk) = buffer.finish() {
            if let Some(last) = absorb(chunk, &mut text, &mut on_chunk) {
                return Ok(finish(model, prompt, text, &last, started));
            }
        }

        Err(RouterError::LocalInferenceFailure(
            "Stream ended before generation completed".to_string(),
        ))
    }

    /// Download a model, then refresh the registry
    pub async fn pull_model(&self, name: &str) -> Result<()> {
        info!(model = %name, "Pulling model");

        let response = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&json!({ "name": name, "stream": false }))
            .timeout(PULL_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RouterError::ServiceUnhealthy {
                service: "inference".to_string(),
                status_code: response.status().as_u16(),
            });
        }

        self.refresh_models().await?;
        info!(model = %name, "Model pulled");
        Ok(())
    }

    /// Backend details for one model
    pub async fn show_model(&self, name: &str) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/api/show", self.base_url))
            .json(&json!({ "name": name }))
            .timeout(LIST_TIMEOUT)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Err(RouterError::ModelNotInstalled {
                requested: name.to_string(),
                available: self.available_models().await.join(", "),
            });
        }
        if !response.status().is_success() {
            return Err(RouterError::ServiceUnhealthy {
                service: "inference".to_string(),
                status_code: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

impl Drop for LocalInferenceClient {
    fn drop(&mut self) {
        self.stop_model_refresh();
    }
}

fn generate_body<'a>(
    model: &'a str,
    prompt: &'a str,
    options: &'a GenerationOptions,
    stream: bool,
) -> GenerateRequest<'a> {
    GenerateRequest {
        model,
        prompt,
        stream,
        options: BackendOptions {
            temperature: options.temperature,
            num_predict: options.max_tokens,
            stop: &options.stop,
        },
    }
}

/// Deliver a fragment; returns the chunk back when it ends the stream
fn absorb<F>(chunk: GenerateChunk, text: &mut String, on_chunk: &mut F) -> Option<GenerateChunk>
where
    F: FnMut(&str),
{
    if !chunk.response.is_empty() {
        on_chunk(&chunk.response);
        text.push_str(&chunk.response);
    }
    chunk.done.then_some(chunk)
}

fn finish(
    model: String,
    prompt: &str,
    text: String,
    last: &GenerateChunk,
    started: Instant,
) -> Generation {
    let tokens_used = last
        .reported_tokens()
        .unwrap_or_else(|| estimate_tokens(prompt) + estimate_tokens(&text));

    Generation {
        text,
        model,
        tokens_used,
        processing_time_ms: started.elapsed().as_millis() as u64,
        finish_reason: last.finish_reason(),
    }
}

fn inference_failure(e: reqwest::Error) -> RouterError {
    if e.is_timeout() {
        RouterError::LocalInferenceFailure(format!("Generation timed out: {}", e))
    } else {
        RouterError::LocalInferenceFailure(e.to_string())
    }
}
