/// Mock embedder for testing purposes.
///
/// Generates deterministic embeddings based on text hash.
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use super::Embedder;
use crate::error::Result;

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Useful for exercising the store and ingest paths without network access.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let bytes = hasher.finish().to_le_bytes();

        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|i| f32::from(bytes[i % 8]) / 255.0)
            .collect();

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }
        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        // text-embedding-ada-002 width
        Self { dimensions: 1536 }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
