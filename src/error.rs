/// Error taxonomy shared by every layer of Gale.
///
/// Each variant carries a stable code and an HTTP status so the server can
/// answer with `<code>: <message>` while the full chain is logged.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur while configuring or serving Gale.
#[derive(Error, Debug)]
pub enum GaleError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Decode(String),

    #[error("chat client construction failed: {0}")]
    ChatClient(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded after {0}s")]
    DeadlineExceeded(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GaleError>;

impl GaleError {
    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Decode(_) => "bad_request",
            Self::ChatClient(_) => "chat_client_error",
            Self::Embedding(_) => "embedding_error",
            Self::VectorStore(_) => "vector_store_error",
            Self::Provider(_) => "provider_error",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Io(_) => "io_error",
        }
    }

    /// HTTP status the error maps to. Only malformed input is the caller's fault.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for GaleError {
    fn from(e: reqwest::Error) -> Self {
        Self::Provider(e.to_string())
    }
}

impl IntoResponse for GaleError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = ?self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        (status, format!("{}: {}", self.code(), self)).into_response()
    }
}
