/// Chat model abstraction.
///
/// A `ChatModelFactory` is held by the server and asked for a fresh
/// `ChatModel` on every request.
pub mod openai;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[serde(rename = "user")]
    Human,
    #[serde(rename = "assistant")]
    Ai,
}

impl Role {
    /// Prefix used when a conversation is rendered as plain text.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Human => "Human",
            Self::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role.prefix(), self.content)
    }
}

/// Per-call generation limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Hard cap on generated tokens.
    pub max_tokens: Option<usize>,
    /// Minimum generated length; honoured only by models that support it.
    pub min_length: Option<usize>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the assistant reply to `messages`.
    async fn generate(&self, messages: &[ChatMessage], opts: &CallOptions) -> Result<String>;
}

/// Builds chat clients on demand.
pub trait ChatModelFactory: Send + Sync {
    fn build(&self) -> Result<Arc<dyn ChatModel>>;
}
