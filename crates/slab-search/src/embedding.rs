//! Embedding service clients.
//!
//! Implements the core [`Embedder`] trait for two local model servers:
//! - **[`OllamaEmbedder`]**: `POST /api/embed`, health via `GET /api/tags`.
//! - **[`LmStudioEmbedder`]**: OpenAI-compatible `POST /v1/embeddings`,
//!   health via `GET /v1/models`.
//!
//! Both carry a generous request timeout (default 180s) because the model
//! may be large and cold.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to build the configured client:
//!
//! ```rust,no_run
//! # use slab_search::config::EmbeddingConfig;
//! # use slab_search::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! assert!(create_embedder(&config).unwrap().is_none());
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use slab_search_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const LMSTUDIO_DEFAULT_URL: &str = "http://localhost:1234";

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Strip an Ollama tag suffix (`model:latest` → `model`).
pub fn strip_model_tag(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

async fn error_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

/// Parse a JSON number array into an `f32` vector.
fn parse_vector(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    let arr = value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?;
    Ok(arr
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Ollama ============

/// Embedding client for an Ollama server.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: trim_base(base_url),
            model: model.to_string(),
            client: http_client(timeout_secs)?,
        })
    }
}

/// Extract the first vector from an `/api/embed` response.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings"))?;
    parse_vector(first, "Ollama")
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            bail!("text cannot be empty");
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Ollama request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Ollama API error {}: {}", status, error_body(response).await);
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_response(&json)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .context("ollama not available")?;

        let status = response.status();
        if !status.is_success() {
            bail!("ollama returned status {}", status);
        }

        let json: serde_json::Value = response.json().await.context("decode tags response")?;
        let wanted = strip_model_tag(&self.model);
        let found = json
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models.iter().any(|m| {
                    m.get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| strip_model_tag(n) == wanted)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        if !found {
            bail!(
                "model {} not found (run: ollama pull {})",
                self.model,
                self.model
            );
        }
        Ok(())
    }
}

// ============ LM Studio ============

/// Embedding client for LM Studio's OpenAI-compatible server.
pub struct LmStudioEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LmStudioEmbedder {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: trim_base(base_url),
            model: model.to_string(),
            client: http_client(timeout_secs)?,
        })
    }
}

/// Extract the first `data[].embedding` from an OpenAI-style response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .ok_or_else(|| anyhow!("Invalid LM Studio response: missing data[0].embedding"))?;
    parse_vector(first, "LM Studio")
}

#[async_trait]
impl Embedder for LmStudioEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            bail!("text cannot be empty");
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("LM Studio request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("LM Studio API error {}: {}", status, error_body(response).await);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }

    /// Any loaded model counts as healthy; LM Studio may accept model
    /// names that it does not list.
    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .context("lmstudio not available")?;

        let status = response.status();
        if !status.is_success() {
            bail!("lmstudio returned status {}", status);
        }

        let json: serde_json::Value = response.json().await.context("decode models response")?;
        let loaded = json
            .get("data")
            .and_then(|d| d.as_array())
            .map(|d| !d.is_empty())
            .unwrap_or(false);
        if !loaded {
            bail!("no models loaded in lmstudio");
        }
        Ok(())
    }
}

/// Build the configured [`Embedder`], or `None` when embeddings are
/// disabled.
///
/// | Config Value | Client | Default URL |
/// |-------------|--------|-------------|
/// | `"disabled"` | none | |
/// | `"ollama"` | [`OllamaEmbedder`] | `http://localhost:11434` |
/// | `"lmstudio"` | [`LmStudioEmbedder`] | `http://localhost:1234` |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    let model = config
        .model
        .as_deref()
        .ok_or_else(|| anyhow!("embedding.model required for provider '{}'", config.provider))?;

    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "ollama" => Arc::new(OllamaEmbedder::new(
            config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL),
            model,
            config.timeout_secs,
        )?),
        "lmstudio" => Arc::new(LmStudioEmbedder::new(
            config.url.as_deref().unwrap_or(LMSTUDIO_DEFAULT_URL),
            model,
            config.timeout_secs,
        )?),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(Some(embedder))
}
