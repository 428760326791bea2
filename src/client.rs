//! HTTP client for the Groq OpenAI-compatible chat-completions API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::Value;
use thiserror::Error;

use crate::models::{ChatCompletion, ChatRequest};

/// Failure of a single model call. Every variant is terminal for the run.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("Failed to reach model endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to parse model response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Model response contained no choices")]
    EmptyResponse,
}

/// Build the HTTP client shared by every run. Credentials are attached per
/// request, so one connection pool serves all callers.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Client bound to one caller-supplied credential.
#[must_use]
#[derive(Clone)]
pub struct ChatClient {
    http_client: reqwest::Client,
    base_url: String,
    auth: HeaderValue,
}

impl ChatClient {
    /// Client sharing `http_client`'s connection pool.
    pub fn new(http_client: reqwest::Client, base_url: &str, api_key: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("API key contains characters that cannot be sent in a header")?;
        auth.set_sensitive(true);

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Send one non-streaming completion request and read the full response.
    pub async fn create_completion(
        &self,
        request: &ChatRequest<'_>,
    ) -> Result<ChatCompletion, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.map_or(0, <[_]>::len),
            "Calling chat completions"
        );
        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, self.auth.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = upstream_error_message(status.as_u16(), &response_text);
            tracing::warn!(status = status.as_u16(), %message, "Chat completions call failed");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = serde_json::from_str(&response_text)?;
        if completion.choices.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(completion)
    }
}

/// Pick the most useful message out of a failed response body.
///
/// A structured `{"error": {"message": ...}}` wins; a body that is not JSON is
/// returned verbatim; anything else falls back to the bare status.
#[must_use]
pub fn upstream_error_message(status: u16, body: &str) -> String {
    let fallback = format!("Groq API error: {status}");
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map_or(fallback, str::to_string),
        Err(_) if !body.is_empty() => body.to_string(),
        Err(_) => fallback,
    }
}
