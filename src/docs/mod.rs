//! Client for the Context7 documentation service.
//!
//! Each operation is a single JSON-RPC `tools/call` POST whose response is an
//! event-stream body (see [`envelope`]). There is no retry: one failed call is
//! a failed tool invocation.

pub mod envelope;

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use self::envelope::EnvelopeError;

pub const DEFAULT_DOCS_URL: &str = "https://mcp.context7.com/mcp";
/// Token budget requested on every documentation fetch.
pub const DEFAULT_DOC_TOKENS: u64 = 10_000;
/// Longest documentation text handed to the model, in characters.
pub const MAX_DOC_CHARS: usize = 10_000;
pub const TRUNCATION_MARKER: &str = " (truncated)";
pub const DEFAULT_TOPIC: &str = "general";

const RESOLVE_METHOD: &str = "resolve-library-id";
const DOCS_METHOD: &str = "get-library-docs";
const CODE_FENCE: &str = "```";
const ACCEPT_EVENT_STREAM: &str = "application/json, text/event-stream";

/// Failure of one documentation-service call.
#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error("Context7 API error: {status} {reason}")]
    Http { status: u16, reason: String },
    #[error("Context7 request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Normalized documentation returned by [`DocsClient::fetch_documentation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Documentation {
    pub library_id: String,
    pub documentation: String,
    pub code_snippets: usize,
    pub topic: String,
}

#[derive(Clone)]
pub struct DocsClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl DocsClient {
    /// Client sharing `http_client`'s connection pool.
    pub fn new(http_client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            http_client,
            endpoint: endpoint.to_string(),
        }
    }

    /// Resolve a library name to Context7-compatible identifiers.
    ///
    /// The service's `result.content` is passed through untouched; an absent
    /// content member becomes an empty object.
    pub async fn resolve_library_id(
        &self,
        library_name: &str,
    ) -> Result<Value, RemoteServiceError> {
        let result = self
            .call_tool(RESOLVE_METHOD, json!({ "libraryName": library_name }))
            .await?;
        Ok(match result.get("content") {
            Some(content) if !content.is_null() => content.clone(),
            _ => json!({}),
        })
    }

    /// Fetch documentation text for a resolved library identifier, always
    /// asking for [`DEFAULT_DOC_TOKENS`].
    pub async fn fetch_documentation(
        &self,
        library_id: &str,
        topic: Option<&str>,
    ) -> Result<Documentation, RemoteServiceError> {
        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        let mut arguments = json!({
            "context7CompatibleLibraryID": library_id,
            "tokens": DEFAULT_DOC_TOKENS,
        });
        if let Some(topic) = topic {
            arguments["topic"] = json!(topic);
        }

        let result = self.call_tool(DOCS_METHOD, arguments).await?;
        let text = normalize_content(result.get("content").unwrap_or(&Value::Null));
        let documentation = truncate_documentation(&text);
        let code_snippets = count_code_snippets(&documentation);
        tracing::debug!(
            library_id,
            chars = text.chars().count(),
            code_snippets,
            "Fetched documentation"
        );

        Ok(Documentation {
            library_id: library_id.to_string(),
            documentation,
            code_snippets,
            topic: topic.unwrap_or(DEFAULT_TOPIC).to_string(),
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, RemoteServiceError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": next_id(),
            "method": "tools/call",
            "params": {
                "name": name,
                "arguments": arguments,
            }
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(ACCEPT, ACCEPT_EVENT_STREAM)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteServiceError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let text = response.text().await?;
        Ok(envelope::decode(&text)?)
    }
}

/// Flatten the service's content into one string.
///
/// Strings pass through, arrays of `{text}`/`{content}` fragments are joined
/// with newlines, objects are serialized. Falsy scalars become empty.
#[must_use]
pub fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                ["text", "content"]
                    .iter()
                    .find_map(|key| {
                        item.get(key)
                            .and_then(Value::as_str)
                            .filter(|s| !s.is_empty())
                    })
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => content.to_string(),
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "true".to_string(),
        Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
        Value::Number(n) => n.to_string(),
    }
}

/// Cap documentation at [`MAX_DOC_CHARS`] characters, marking the cut.
#[must_use]
pub fn truncate_documentation(text: &str) -> String {
    match text.char_indices().nth(MAX_DOC_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Number of fenced code blocks, counted as fence occurrences minus one.
#[must_use]
pub fn count_code_snippets(text: &str) -> usize {
    text.matches(CODE_FENCE).count().saturating_sub(1)
}

fn next_id() -> u64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    u64::try_from(micros).unwrap_or(u64::MAX)
}
