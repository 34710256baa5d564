/// End-to-end tests of the HTTP layer against stubbed providers.
///
/// Covers the full request path:
///   JSON decode → chat client → retriever → memory → chain → JSON encode
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use gale::config::PipelineConfig;
use gale::error::{GaleError, Result};
use gale::llm::{CallOptions, ChatMessage, ChatModel, ChatModelFactory};
use gale::server::{AppContext, Answer, router};
use gale::tokenizer::ApproxTokenCounter;
use gale::vectorstore::{Document, VectorStore};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

// ── Stubs ────────────────────────────────────────────────────────────

#[derive(Default)]
struct StubStore {
    queries: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl VectorStore for StubStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<(Document, f32)>> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        Ok(vec![
            (Document::new("Gale is a question answering service."), 0.92),
            (Document::new("Answers are grounded in a Pinecone index."), 0.87),
        ])
    }

    async fn add_documents(&self, _docs: &[Document]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_all(&self) -> Result<()> {
        Ok(())
    }
}

enum Behaviour {
    Reply(&'static str),
    Fail(&'static str),
    Hang,
}

/// Records what happened to a model call that never finished on its own.
#[derive(Default)]
struct InFlight {
    started: Notify,
    dropped: AtomicBool,
}

struct SetOnDrop(Arc<InFlight>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.dropped.store(true, Ordering::SeqCst);
    }
}

struct StubModel {
    behaviour: Arc<Behaviour>,
    prompts: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<InFlight>,
}

#[async_trait]
impl ChatModel for StubModel {
    async fn generate(&self, messages: &[ChatMessage], _opts: &CallOptions) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push(messages[0].content.clone());
        match *self.behaviour {
            Behaviour::Reply(text) => Ok(text.to_string()),
            Behaviour::Fail(msg) => Err(GaleError::Provider(msg.to_string())),
            Behaviour::Hang => {
                let _armed = SetOnDrop(self.in_flight.clone());
                self.in_flight.started.notify_one();
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_string())
            }
        }
    }
}

struct StubFactory {
    build_error: Option<&'static str>,
    behaviour: Arc<Behaviour>,
    prompts: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<InFlight>,
}

impl StubFactory {
    fn replying(text: &'static str) -> Self {
        Self::with(None, Behaviour::Reply(text))
    }

    fn with(build_error: Option<&'static str>, behaviour: Behaviour) -> Self {
        Self {
            build_error,
            behaviour: Arc::new(behaviour),
            prompts: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(InFlight::default()),
        }
    }
}

impl ChatModelFactory for StubFactory {
    fn build(&self) -> Result<Arc<dyn ChatModel>> {
        if let Some(msg) = self.build_error {
            return Err(GaleError::ChatClient(msg.to_string()));
        }
        Ok(Arc::new(StubModel {
            behaviour: self.behaviour.clone(),
            prompts: self.prompts.clone(),
            in_flight: self.in_flight.clone(),
        }))
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    app: axum::Router,
    store: Arc<StubStore>,
    prompts: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<InFlight>,
    shutdown: CancellationToken,
    _static_dir: TempDir,
}

fn harness(factory: StubFactory, timeout: Duration) -> Harness {
    let static_dir = tempfile::tempdir().unwrap();
    fs::write(
        static_dir.path().join("index.html"),
        "<!DOCTYPE html><html><body><h1>Gale</h1></body></html>",
    )
    .unwrap();
    fs::write(static_dir.path().join("app.js"), "console.log('gale');").unwrap();

    let store = Arc::new(StubStore::default());
    let prompts = factory.prompts.clone();
    let in_flight = factory.in_flight.clone();
    let shutdown = CancellationToken::new();
    let ctx = Arc::new(AppContext {
        store: store.clone(),
        chat: Arc::new(factory),
        token_counter: Arc::new(ApproxTokenCounter),
        pipeline: PipelineConfig::default(),
        static_dir: static_dir.path().to_path_buf(),
        request_timeout: timeout,
        shutdown: shutdown.clone(),
    });

    Harness {
        app: router(ctx),
        store,
        prompts,
        in_flight,
        shutdown,
        _static_dir: static_dir,
    }
}

fn post_run(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/run")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

const TIMEOUT: Duration = Duration::from_secs(5);

// ── /run ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_returns_answer() {
    let h = harness(StubFactory::replying("Gale answers questions."), TIMEOUT);

    let resp = h
        .app
        .oneshot(post_run(r#"{"input": "What is Gale?"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let answer: Answer = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(answer.input, "What is Gale?");
    assert_eq!(answer.response, "Gale answers questions.");

    // k = 3 retrieval with the raw question on a fresh memory
    assert_eq!(
        *h.store.queries.lock().unwrap(),
        vec![("What is Gale?".to_string(), 3)]
    );
    let prompts = h.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Gale is a question answering service."));
    assert!(prompts[0].contains("Question: What is Gale?"));
}

#[tokio::test]
async fn test_run_echoes_input_verbatim() {
    let h = harness(StubFactory::replying("ok"), TIMEOUT);

    for input in [
        "plain question",
        "",
        "  padded  ",
        "Qu'est-ce que Gale ? 日本語も大丈夫 🚀",
        "she said \"hi\"\nthen left\t\\",
    ] {
        let body = serde_json::json!({ "input": input }).to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/run")
            .body(Body::from(body))
            .unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{input:?}");

        let answer: Answer = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(answer.input, input);
        assert_eq!(answer.response, "ok");
    }
}

#[tokio::test]
async fn test_run_accepts_any_content_type() {
    let h = harness(StubFactory::replying("ok"), TIMEOUT);
    let req = Request::builder()
        .method("POST")
        .uri("/run")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"input": "hi"}"#))
        .unwrap();

    let resp = h.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_run_malformed_json_is_bad_request() {
    let h = harness(StubFactory::replying("unused"), TIMEOUT);

    let resp = h.app.oneshot(post_run("not json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.starts_with("bad_request: "));
    assert!(h.store.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_empty_body_is_bad_request() {
    let h = harness(StubFactory::replying("unused"), TIMEOUT);
    let resp = h.app.oneshot(post_run("")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_missing_input_proceeds_with_empty_string() {
    let h = harness(StubFactory::replying("Please ask a question."), TIMEOUT);

    let resp = h.app.oneshot(post_run("{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let answer: Answer = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(answer.input, "");
    assert_eq!(answer.response, "Please ask a question.");
    assert_eq!(h.store.queries.lock().unwrap()[0].0, "");
}

#[tokio::test]
async fn test_run_chat_client_failure_is_internal_error() {
    let factory = StubFactory::with(Some("invalid api key sk-xyz"), Behaviour::Reply("unused"));
    let h = harness(factory, TIMEOUT);

    let resp = h.app.oneshot(post_run(r#"{"input": "q"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_text(resp).await;
    assert!(body.starts_with("chat_client_error: "), "{body}");
    assert!(body.contains("invalid api key sk-xyz"), "{body}");
    assert!(h.store.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_chain_failure_is_internal_error() {
    let factory = StubFactory::with(None, Behaviour::Fail("model overloaded"));
    let h = harness(factory, TIMEOUT);

    let resp = h.app.oneshot(post_run(r#"{"input": "q"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(resp).await;
    assert!(body.contains("model overloaded"), "{body}");
}

#[tokio::test]
async fn test_run_does_not_carry_memory_between_requests() {
    let h = harness(StubFactory::replying("answer"), TIMEOUT);

    for question in ["first question", "second question"] {
        let req = Request::builder()
            .method("POST")
            .uri("/run")
            .body(Body::from(format!(r#"{{"input": "{question}"}}"#)))
            .unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // No condense step and no history in the second prompt.
    let prompts = h.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[1].contains("Chat History"));
    assert!(!prompts[1].contains("first question"));
}

#[tokio::test]
async fn test_run_deadline_exceeded() {
    let factory = StubFactory::with(None, Behaviour::Hang);
    let h = harness(factory, Duration::from_millis(200));

    let resp = h.app.oneshot(post_run(r#"{"input": "q"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.starts_with("deadline_exceeded: "));
}

#[tokio::test]
async fn test_client_disconnect_drops_model_call() {
    let h = harness(StubFactory::with(None, Behaviour::Hang), TIMEOUT);
    let in_flight = h.in_flight.clone();

    let request = tokio::spawn(h.app.oneshot(post_run(r#"{"input": "q"}"#)));
    in_flight.started.notified().await;
    assert!(!in_flight.dropped.load(Ordering::SeqCst));

    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());
    assert!(in_flight.dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_run() {
    let h = harness(StubFactory::with(None, Behaviour::Hang), TIMEOUT);
    let in_flight = h.in_flight.clone();

    let request = tokio::spawn(h.app.oneshot(post_run(r#"{"input": "q"}"#)));
    in_flight.started.notified().await;
    h.shutdown.cancel();

    let resp = request.await.unwrap().unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.starts_with("cancelled: "));
    assert!(in_flight.dropped.load(Ordering::SeqCst));
}

// ── Pages and static files ───────────────────────────────────────────

#[tokio::test]
async fn test_index_page_is_html() {
    let h = harness(StubFactory::replying("unused"), TIMEOUT);

    let resp = h.app.oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"), "{content_type}");
    assert!(body_text(resp).await.contains("<h1>Gale</h1>"));
}

#[tokio::test]
async fn test_static_file_served() {
    let h = harness(StubFactory::replying("unused"), TIMEOUT);

    let resp = h.app.oneshot(get("/static/app.js")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "console.log('gale');");
}

#[tokio::test]
async fn test_static_missing_is_not_found() {
    let h = harness(StubFactory::replying("unused"), TIMEOUT);

    let resp = h.app.oneshot(get("/static/does-not-exist")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
