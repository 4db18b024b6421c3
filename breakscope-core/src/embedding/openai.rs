// OpenAI-compatible `/v1/embeddings` client.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingSection;
use crate::error::{BreakscopeError, EmbeddingError, Result};

use super::{Embedder, check_dimensions};

#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    batch_size: usize,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
            batch_size: 64,
            dimensions: None,
        }
    }

    /// Build from config, reading the API key from `api_key_env`.
    pub fn from_config(section: &EmbeddingSection) -> Result<Self> {
        let api_key = std::env::var(&section.api_key_env).map_err(|_| {
            EmbeddingError::Config(format!("{} is not set", section.api_key_env))
        })?;
        Ok(Self::new(api_key, section.model.clone())
            .with_base_url(section.base_url.clone())
            .with_batch_size(section.batch_size)
            .with_dimensions(section.dimensions))
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input,
        };

        debug!(model = %self.model, inputs = input.len(), "Calling embeddings API");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError { status, body: text }.into());
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;
        order_by_index(parsed, input.len())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// The API may return data out of order; `index` is authoritative.
fn order_by_index(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: response.data.len(),
        }
        .into());
    }
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in response.data {
        let slot = slots.get_mut(datum.index).ok_or_else(|| {
            EmbeddingError::Parse(format!("embedding index {} out of range", datum.index))
        })?;
        *slot = Some(datum.embedding);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| {
                BreakscopeError::from(EmbeddingError::Parse(format!(
                    "missing embedding for input {i}"
                )))
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request(batch).await?);
        }
        check_dimensions(&vectors, self.dimensions)?;
        Ok(vectors)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
