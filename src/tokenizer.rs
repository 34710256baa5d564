/// Token counting for the conversation memory budget.
///
/// `HfTokenCounter` wraps a HuggingFace `tokenizer.json`; when none is
/// configured the approximate counter is used instead.
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokenizers::Tokenizer;
use tracing::{info, warn};

/// Counts the tokens a piece of text costs against the model context.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Exact counts from a HuggingFace tokenizer file.
pub struct HfTokenCounter {
    inner: Tokenizer,
}

impl HfTokenCounter {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        anyhow::ensure!(path.exists(), "tokenizer file not found: {}", path.display());

        let inner = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        info!(
            "Tokenizer loaded from {} (vocab size: {})",
            path.display(),
            inner.get_vocab_size(false)
        );
        Ok(Self { inner })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                warn!("tokenizer failed, using estimate: {e}");
                ApproxTokenCounter.count(text)
            }
        }
    }
}

/// Roughly four characters per token.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Pick the counter for a configured tokenizer path.
pub fn load_counter(path: Option<&Path>) -> Result<Arc<dyn TokenCounter>> {
    match path {
        Some(p) => Ok(Arc::new(HfTokenCounter::from_file(p)?)),
        None => {
            info!("No tokenizer configured, estimating token counts");
            Ok(Arc::new(ApproxTokenCounter))
        }
    }
}
