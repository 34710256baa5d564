/// OpenAI embeddings client.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::error::{GaleError, Result};
use crate::http::{build_client, check_status};

/// Inputs per embeddings request.
const BATCH_SIZE: usize = 512;

/// Output width of `text-embedding-ada-002`.
pub const ADA_002_DIMENSIONS: usize = 1536;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by `POST {base_url}/embeddings`.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create a new embedder. Fails if the API key is empty.
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(GaleError::Embedding("missing OpenAI API key".to_string()));
        }
        Ok(Self {
            client: build_client("gale-embedder")?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions: ADA_002_DIMENSIONS,
        })
    }

    /// Override the advertised dimensionality for models other than ada-002.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| GaleError::Embedding(format!("request failed: {e}")))?;

        let resp = check_status(resp, "OpenAI embeddings")
            .await
            .map_err(|e| GaleError::Embedding(e.to_string()))?;

        let mut body: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| GaleError::Embedding(format!("invalid response: {e}")))?;

        if body.data.len() != texts.len() {
            return Err(GaleError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| GaleError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            debug!(count = batch.len(), "embedding document batch");
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
