//! Concrete embedding providers.
//!
//! Implements the core [`Embedder`] trait for:
//! - **disabled**: every call fails; matching runs keyword-only.
//! - **hashing**: offline [`HashingEmbedder`] from `logfix-core`.
//! - **openai**: `POST {url}/embeddings`, OpenAI-compatible.
//! - **ollama**: `POST {url}/api/embeddings` on a local Ollama server.
//!
//! # Retry Strategy
//!
//! Remote providers retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use logfix_core::embedding::{DisabledEmbedder, Embedder, HashingEmbedder};

use crate::config::EmbeddingConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Create the [`Embedder`] selected by `[embedding].provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Shared HTTP plumbing for the remote providers.
struct RemoteEndpoint {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl RemoteEndpoint {
    fn new(config: &EmbeddingConfig, default_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `path` with retry/backoff and return the JSON reply.
    async fn post_json(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "Embedding API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }
                    bail!("Embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

fn check_dims(vec: Vec<f32>, dims: usize) -> Result<Vec<f32>> {
    if vec.len() != dims {
        bail!("Embedding has {} dimensions, expected {}", vec.len(), dims);
    }
    Ok(vec)
}

fn json_floats(value: Option<&serde_json::Value>, what: &str) -> Result<Vec<f32>> {
    let array = value
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing {}", what))?;
    array
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                anyhow::anyhow!("Malformed embedding: {}[{}] is not a number", what, i)
            })
        })
        .collect()
}

/// OpenAI-compatible embeddings API. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    endpoint: RemoteEndpoint,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            endpoint: RemoteEndpoint::new(config, OPENAI_DEFAULT_URL)?,
            model,
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = self
            .endpoint
            .post_json("/embeddings", Some(&api_key), &body)
            .await?;
        let first = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"));
        check_dims(json_floats(first, "data[0].embedding")?, self.dims)
    }
}

/// Local Ollama embeddings.
pub struct OllamaEmbedder {
    endpoint: RemoteEndpoint,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self {
            endpoint: RemoteEndpoint::new(config, OLLAMA_DEFAULT_URL)?,
            model,
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });
        let json = self.endpoint.post_json("/api/embeddings", None, &body).await?;
        check_dims(json_floats(json.get("embedding"), "embedding")?, self.dims)
    }
}
