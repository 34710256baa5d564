/// Embedder trait for turning text into vectors.
///
/// The production implementation calls the OpenAI embeddings endpoint;
/// the mock is deterministic and used in tests.
pub mod mock;
pub mod openai;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` so one instance can be shared
/// behind `Arc` by the vector store and every request.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of documents, preserving order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;
}
