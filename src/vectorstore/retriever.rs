use std::sync::Arc;

use tracing::debug;

use super::{Document, VectorStore};
use crate::error::Result;

/// Top-k similarity search over a shared store handle.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    k: usize,
}

/// Narrow a store handle to a `k`-limited retriever.
pub fn to_retriever(store: Arc<dyn VectorStore>, k: usize) -> Retriever {
    Retriever { store, k }
}

impl Retriever {
    /// Documents most similar to `query`, at most `k`, in the order the
    /// index ranked them.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<(Document, f32)>> {
        let mut results = self.store.similarity_search(query, self.k).await?;
        results.truncate(self.k);
        debug!(count = results.len(), k = self.k, "retrieved documents");
        Ok(results)
    }

    /// Same as [`Retriever::retrieve`] without the scores.
    pub async fn relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        Ok(self
            .retrieve(query)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }
}
