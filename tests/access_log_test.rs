/// Access logging of the HTTP layer at the default `info` filter.
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use gale::config::PipelineConfig;
use gale::error::{GaleError, Result};
use gale::llm::{ChatModel, ChatModelFactory};
use gale::server::{AppContext, router};
use gale::tokenizer::ApproxTokenCounter;
use gale::vectorstore::{Document, VectorStore};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

struct EmptyStore;

#[async_trait]
impl VectorStore for EmptyStore {
    async fn similarity_search(&self, _query: &str, _k: usize) -> Result<Vec<(Document, f32)>> {
        Ok(Vec::new())
    }

    async fn add_documents(&self, _docs: &[Document]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_all(&self) -> Result<()> {
        Ok(())
    }
}

struct NoChat;

impl ChatModelFactory for NoChat {
    fn build(&self) -> Result<Arc<dyn ChatModel>> {
        Err(GaleError::ChatClient("not used".into()))
    }
}

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_requests_logged_at_info() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let static_dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(AppContext {
        store: Arc::new(EmptyStore),
        chat: Arc::new(NoChat),
        token_counter: Arc::new(ApproxTokenCounter),
        pipeline: PipelineConfig::default(),
        static_dir: static_dir.path().to_path_buf(),
        request_timeout: Duration::from_secs(5),
        shutdown: CancellationToken::new(),
    }));

    let req = Request::builder()
        .uri("/static/nope.js")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let output = log.text();
    assert!(output.contains("finished processing request"), "{output}");
    assert!(output.contains("method=GET"), "{output}");
    assert!(output.contains("uri=/static/nope.js"), "{output}");
    assert!(output.contains("status=404"), "{output}");
    assert!(output.contains("latency="), "{output}");
}
