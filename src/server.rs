/// HTTP layer: one page route, the static assets and the `/run` action.
///
/// All long-lived collaborators arrive through `AppContext`, built once at
/// startup. The chat client, memory and chain are built per request.
///
/// A `/run` stops at its next provider call when the server shuts down, and
/// immediately when the client disconnects (axum drops the handler future).
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, error, info};

use crate::chain::{ConversationalRetrievalQa, RunOptions};
use crate::config::PipelineConfig;
use crate::error::GaleError;
use crate::llm::ChatModelFactory;
use crate::memory::ConversationTokenBuffer;
use crate::tokenizer::TokenCounter;
use crate::vectorstore::{VectorStore, to_retriever};

/// Shared, immutable state handed to every request.
pub struct AppContext {
    pub store: Arc<dyn VectorStore>,
    pub chat: Arc<dyn ChatModelFactory>,
    pub token_counter: Arc<dyn TokenCounter>,
    pub pipeline: PipelineConfig,
    pub static_dir: PathBuf,
    pub request_timeout: Duration,
    /// Cancelled on shutdown; every request runs under a child token.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub input: String,
    pub response: String,
}

/// Build the application router.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let static_files = ServeDir::new(&ctx.static_dir);
    Router::new()
        .route("/", get(index))
        .route("/run", post(run))
        .nest_service("/static", static_files)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(ctx)
}

/// Bind `0.0.0.0:{port}` and serve until Ctrl+C.
pub async fn serve(ctx: Arc<AppContext>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Gale started. Press CTRL+C to quit.");
    info!(%addr, "listening");

    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("HTTP server error")?;

    info!("Gale stopped");
    Ok(())
}

/// Resolve on Ctrl+C or once `shutdown` is cancelled elsewhere, then cancel
/// in-flight requests.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("failed to listen for Ctrl+C: {e}");
                shutdown.cancelled().await;
            }
        }
        () = shutdown.cancelled() => {}
    }
    info!("Shutting down");
    shutdown.cancel();
}

async fn index(State(ctx): State<Arc<AppContext>>) -> Result<Html<String>, GaleError> {
    let page = tokio::fs::read_to_string(ctx.static_dir.join("index.html")).await?;
    Ok(Html(page))
}

async fn run(
    State(ctx): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<Json<Answer>, GaleError> {
    let query: Query =
        serde_json::from_slice(&body).map_err(|e| GaleError::Decode(e.to_string()))?;
    let input = query.input.unwrap_or_default();

    let llm = ctx.chat.build()?;
    let retriever = to_retriever(ctx.store.clone(), ctx.pipeline.retriever_k);
    let memory = ConversationTokenBuffer::new(
        ctx.token_counter.clone(),
        ctx.pipeline.memory_max_tokens,
    );
    let mut chain = ConversationalRetrievalQa::new(llm, retriever, memory);
    let opts = RunOptions {
        max_tokens: ctx.pipeline.max_tokens,
        min_length: ctx.pipeline.min_length,
    };

    let cancel = ctx.shutdown.child_token();
    let response = tokio::time::timeout(ctx.request_timeout, chain.run(&cancel, &input, opts))
        .await
        .map_err(|_| GaleError::DeadlineExceeded(ctx.request_timeout.as_secs()))??;

    debug!(chars = response.len(), "answer generated");
    Ok(Json(Answer { input, response }))
}
