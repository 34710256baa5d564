/// Pinecone vector store over the REST API.
///
/// The handle is built once at startup (describe-index handshake) and is
/// immutable afterwards, so it can be shared by every request.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Document, VectorStore};
use crate::embedder::Embedder;
use crate::error::{GaleError, Result};
use crate::http::{build_client, check_status};

/// Metadata key holding the document text.
pub const TEXT_KEY: &str = "text";

/// Vectors per upsert request.
const UPSERT_BATCH_SIZE: usize = 100;

// ── Connection settings ──────────────────────────────────────────────

/// Where the control plane and the index data plane live.
#[derive(Debug, Clone)]
pub struct PineconeEndpoints {
    pub controller: String,
    pub data: String,
}

impl PineconeEndpoints {
    /// Hosted endpoints for an environment / index / project triple.
    #[must_use]
    pub fn hosted(environment: &str, index_name: &str, project_name: &str) -> Self {
        Self {
            controller: format!("https://controller.{environment}.pinecone.io"),
            data: format!("https://{index_name}-{project_name}.svc.{environment}.pinecone.io"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PineconeOptions {
    pub api_key: String,
    pub environment: String,
    pub index_name: String,
    pub project_name: String,
    pub namespace: String,
}

impl PineconeOptions {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("api key", &self.api_key),
            ("environment", &self.environment),
            ("index name", &self.index_name),
            ("project name", &self.project_name),
        ] {
            if value.trim().is_empty() {
                return Err(GaleError::VectorStore(format!("missing Pinecone {name}")));
            }
        }
        Ok(())
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IndexDescription {
    pub database: IndexDatabase,
    #[serde(default)]
    pub status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
pub struct IndexDatabase {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: HashMap<String, Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    delete_all: bool,
    namespace: &'a str,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
}

// ── Index management ─────────────────────────────────────────────────

/// Control-plane client, usable before the index exists.
pub struct PineconeControl {
    client: Client,
    api_key: String,
    controller: String,
}

impl PineconeControl {
    pub fn new(api_key: &str, controller: &str) -> Result<Self> {
        Ok(Self {
            client: build_client("gale-pinecone")?,
            api_key: api_key.to_string(),
            controller: controller.trim_end_matches('/').to_string(),
        })
    }

    /// Names of the indexes in the project.
    pub async fn list_indexes(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/databases", self.controller))
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;
        let resp = check_status(resp, "Pinecone").await.map_err(store_err)?;
        resp.json().await.map_err(transport_err)
    }

    /// Describe one index; errors if it does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let resp = self
            .client
            .get(format!("{}/databases/{name}", self.controller))
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GaleError::VectorStore(format!("index {name} not found")));
        }
        let resp = check_status(resp, "Pinecone").await.map_err(store_err)?;
        resp.json().await.map_err(transport_err)
    }

    pub async fn create_index(&self, name: &str, dimension: usize, metric: &str) -> Result<()> {
        info!(name, dimension, metric, "Creating Pinecone index");
        let resp = self
            .client
            .post(format!("{}/databases", self.controller))
            .header("Api-Key", &self.api_key)
            .json(&CreateIndexRequest {
                name,
                dimension,
                metric,
            })
            .send()
            .await
            .map_err(transport_err)?;
        check_status(resp, "Pinecone").await.map_err(store_err)?;
        Ok(())
    }
}

// ── Store ────────────────────────────────────────────────────────────

pub struct PineconeStore {
    client: Client,
    api_key: String,
    data_url: String,
    namespace: String,
    embedder: Arc<dyn Embedder>,
}

impl PineconeStore {
    /// Connect to the hosted index described by `opts`.
    pub async fn new(opts: PineconeOptions, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let endpoints =
            PineconeEndpoints::hosted(&opts.environment, &opts.index_name, &opts.project_name);
        Self::with_endpoints(opts, endpoints, embedder).await
    }

    /// Connect using explicit endpoints.
    ///
    /// Fails if the options are incomplete or the index cannot be described.
    pub async fn with_endpoints(
        opts: PineconeOptions,
        endpoints: PineconeEndpoints,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        opts.validate()?;

        let control = PineconeControl::new(&opts.api_key, &endpoints.controller)?;
        let description = control.describe_index(&opts.index_name).await?;

        if description.database.dimension != embedder.dimensions() {
            warn!(
                index_dimension = description.database.dimension,
                embedder_dimension = embedder.dimensions(),
                "Index dimension does not match the embedder"
            );
        }
        if let Some(status) = &description.status {
            if !status.ready {
                warn!(state = ?status.state, "Pinecone index is not ready yet");
            }
        }
        info!(
            index = %description.database.name,
            metric = description.database.metric.as_deref().unwrap_or("unknown"),
            "Connected to Pinecone index"
        );

        Ok(Self {
            client: control.client,
            api_key: opts.api_key,
            data_url: endpoints.data.trim_end_matches('/').to_string(),
            namespace: opts.namespace,
            embedder,
        })
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<(Document, f32)>> {
        let vector = self.embedder.embed_query(query).await?;

        let resp = self
            .client
            .post(format!("{}/query", self.data_url))
            .header("Api-Key", &self.api_key)
            .json(&QueryRequest {
                vector: &vector,
                top_k: k,
                include_metadata: true,
                include_values: false,
                namespace: &self.namespace,
            })
            .send()
            .await
            .map_err(transport_err)?;
        let resp = check_status(resp, "Pinecone").await.map_err(store_err)?;
        let body: QueryResponse = resp.json().await.map_err(transport_err)?;

        let mut results = Vec::with_capacity(body.matches.len());
        for m in body.matches {
            let mut metadata = m.metadata;
            let page_content = match metadata.remove(TEXT_KEY) {
                Some(Value::String(text)) => text,
                _ => {
                    return Err(GaleError::VectorStore(format!(
                        "match is missing the {TEXT_KEY:?} metadata key"
                    )));
                }
            };
            results.push((
                Document {
                    page_content,
                    metadata,
                },
                m.score,
            ));
        }
        debug!(count = results.len(), "Pinecone query complete");
        Ok(results)
    }

    async fn add_documents(&self, docs: &[Document]) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = docs.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        let ids: Vec<String> = docs
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        let records: Vec<(&String, &Document, &Vec<f32>)> =
            ids.iter().zip(docs).zip(&vectors).map(|((i, d), v)| (i, d, v)).collect();

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<UpsertVector<'_>> = batch
                .iter()
                .map(|&(id, doc, values)| {
                    let mut metadata = doc.metadata.clone();
                    metadata.insert(TEXT_KEY.to_string(), Value::String(doc.page_content.clone()));
                    UpsertVector {
                        id: id.as_str(),
                        values: values.as_slice(),
                        metadata,
                    }
                })
                .collect();

            let resp = self
                .client
                .post(format!("{}/vectors/upsert", self.data_url))
                .header("Api-Key", &self.api_key)
                .json(&UpsertRequest {
                    vectors,
                    namespace: &self.namespace,
                })
                .send()
                .await
                .map_err(transport_err)?;
            check_status(resp, "Pinecone").await.map_err(store_err)?;
            debug!(count = batch.len(), "Upserted vectors");
        }

        Ok(ids)
    }

    async fn delete_all(&self) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/vectors/delete", self.data_url))
            .header("Api-Key", &self.api_key)
            .json(&DeleteRequest {
                delete_all: true,
                namespace: &self.namespace,
            })
            .send()
            .await
            .map_err(transport_err)?;
        check_status(resp, "Pinecone").await.map_err(store_err)?;
        info!("Deleted all vectors from index");
        Ok(())
    }
}

/// Re-tag a provider failure as a vector store failure, keeping its message.
fn store_err(e: GaleError) -> GaleError {
    match e {
        GaleError::Provider(msg) => GaleError::VectorStore(msg),
        other => other,
    }
}

fn transport_err(e: reqwest::Error) -> GaleError {
    GaleError::VectorStore(e.to_string())
}
