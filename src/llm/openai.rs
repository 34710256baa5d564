/// OpenAI chat completions client.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CallOptions, ChatMessage, ChatModel, ChatModelFactory};
use crate::error::{GaleError, Result};
use crate::http::{build_client, check_status};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

fn chat_http_client() -> Result<Client> {
    build_client("gale-chat").map_err(|e| GaleError::ChatClient(e.to_string()))
}

impl OpenAiChat {
    /// Fails if the API key or model is empty.
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        Self::with_client(chat_http_client()?, api_key, base_url, model)
    }

    /// Same as [`OpenAiChat::new`], reusing an existing connection pool.
    pub fn with_client(client: Client, api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(GaleError::ChatClient("missing OpenAI API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(GaleError::ChatClient("missing OpenAI model".to_string()));
        }
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn generate(&self, messages: &[ChatMessage], opts: &CallOptions) -> Result<String> {
        // The completions API has no minimum-length parameter; `min_length` is not sent.
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                max_tokens: opts.max_tokens,
            })
            .send()
            .await?;
        let resp = check_status(resp, "OpenAI").await?;
        let body: CompletionResponse = resp.json().await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GaleError::Provider("OpenAI returned no choices".to_string()))?;
        debug!(
            model = %self.model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "chat completion received"
        );
        Ok(choice.message.content.unwrap_or_default())
    }
}

/// Builds an `OpenAiChat` per request from fixed settings.
///
/// The settings are checked on every `build`; the connection pool is shared.
#[derive(Debug, Clone)]
pub struct OpenAiChatFactory {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChatFactory {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: chat_http_client()?,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }
}

impl ChatModelFactory for OpenAiChatFactory {
    fn build(&self) -> Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(OpenAiChat::with_client(
            self.client.clone(),
            &self.api_key,
            &self.base_url,
            &self.model,
        )?))
    }
}
