/// Vector store abstraction and the documents it returns.
///
/// The store embeds text itself, so callers only ever pass plain strings.
pub mod pinecone;
pub mod retriever;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use retriever::{Retriever, to_retriever};

/// A piece of text stored in (or retrieved from) the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    #[must_use]
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A remote similarity index with an embedding function attached.
///
/// Implementations are shared read-only across requests.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return at most `k` documents, most similar first, with their scores.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<(Document, f32)>>;

    /// Embed and store documents, returning their ids.
    async fn add_documents(&self, docs: &[Document]) -> Result<Vec<String>>;

    /// Remove every vector from the store.
    async fn delete_all(&self) -> Result<()>;
}
