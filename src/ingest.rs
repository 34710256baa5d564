/// Loading documents into the vector index.
///
/// Backs the `gale index` command: make sure the index exists, read a file,
/// split it into chunks and upsert them; or wipe the index.
use std::path::Path;
use std::sync::Arc;

use pulldown_cmark::{Event, Parser, TagEnd};
use tracing::info;

use crate::error::{GaleError, Result};
use crate::splitter::RecursiveCharacterTextSplitter;
use crate::vectorstore::pinecone::PineconeControl;
use crate::vectorstore::{Document, VectorStore};

pub const INDEX_METRIC: &str = "cosine";
pub const INDEX_DIMENSION: usize = 1536;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestResult {
    pub chunks: usize,
    pub ids: Vec<String>,
}

/// Create `name` unless the project already has it. Returns `true` if created.
pub async fn ensure_index(control: &PineconeControl, name: &str, dimension: usize) -> Result<bool> {
    info!("Checking if index exists");
    let existing = control.list_indexes().await?;
    if existing.iter().any(|n| n == name) {
        info!("Index exists: {name}");
        return Ok(false);
    }
    info!("Creating index: {name}");
    control.create_index(name, dimension, INDEX_METRIC).await?;
    Ok(true)
}

/// Read a file as a single document tagged with its `source`.
///
/// Markdown is flattened to plain text; anything else must be UTF-8 text.
pub fn load_document(path: &Path) -> Result<Document> {
    let raw = std::fs::read_to_string(path)?;
    let is_markdown = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "markdown")
    );
    let text = if is_markdown {
        markdown_to_text(&raw)
    } else {
        raw
    };
    Ok(Document::new(text).with_metadata("source", path.to_string_lossy().replace('\\', "/")))
}

/// Strip markdown syntax, keeping block boundaries as blank lines so the
/// splitter still sees paragraphs.
fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                out.push_str("\n\n");
            }
            Event::End(TagEnd::Item) => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    splitter: RecursiveCharacterTextSplitter,
}

impl Ingestor {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            splitter: RecursiveCharacterTextSplitter::default(),
        }
    }

    #[must_use]
    pub fn with_splitter(mut self, splitter: RecursiveCharacterTextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Split a document into chunks that inherit its metadata.
    pub fn split_document(&self, doc: &Document) -> Vec<Document> {
        self.splitter
            .split_text(&doc.page_content)
            .into_iter()
            .map(|chunk| Document {
                page_content: chunk,
                metadata: doc.metadata.clone(),
            })
            .collect()
    }

    /// Load, split and upsert one file.
    pub async fn load_file(&self, path: &Path) -> Result<IngestResult> {
        if !path.is_file() {
            return Err(GaleError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }

        info!("Loading file {} as document", path.display());
        let doc = load_document(path)?;

        info!("Splitting up document into text");
        let chunks = self.split_document(&doc);
        if chunks.is_empty() {
            info!("Document is empty, nothing to add");
            return Ok(IngestResult::default());
        }

        info!(chunks = chunks.len(), "Adding document into vector database");
        let ids = self.store.add_documents(&chunks).await?;
        Ok(IngestResult {
            chunks: chunks.len(),
            ids,
        })
    }

    pub async fn delete_all(&self) -> Result<()> {
        info!("Delete all from vectordb");
        self.store.delete_all().await
    }
}
