/// Shared outbound HTTP helpers for the provider clients.
use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;

use crate::error::{GaleError, Result};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Build the `reqwest::Client` shared by a provider client.
///
/// Only the connect phase is bounded here; overall request deadlines are
/// owned by the caller.
pub fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(user_agent)
        .build()
        .map_err(|e| GaleError::Provider(format!("HTTP client build failed: {e}")))
}

/// Pass through a successful response, otherwise turn the provider's error
/// body into a readable message.
pub async fn check_status(resp: Response, provider: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GaleError::Provider(format!(
        "{provider} returned {status}: {}",
        extract_error_message(&body)
    )))
}

/// Pull `error.message` (OpenAI) or `message` (Pinecone) out of an error body,
/// falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["message"].as_str())
                .or_else(|| v["error"].as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
