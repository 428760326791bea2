//! Decoder for SSE-framed JSON-RPC responses.
//!
//! The documentation service answers a `tools/call` POST with an event-stream
//! body. Only the first `data: ` line matters: it carries the whole JSON-RPC
//! response envelope. Anything else in the body (event names, ids, blank
//! separators, later data lines) is ignored.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("No data found in SSE response")]
    MissingData,
    #[error("Malformed JSON-RPC envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Context7 API error: {message}")]
    Rpc { code: Option<i64>, message: String },
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Return the payload of the first `data: ` line, if any.
#[must_use]
pub fn first_data_line(body: &str) -> Option<&str> {
    body.lines()
        .find_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|data| data.trim_end_matches('\r'))
        .filter(|data| !data.trim().is_empty())
}

/// Decode the envelope and return its `result` member (`null` when absent).
pub fn decode(body: &str) -> Result<Value, EnvelopeError> {
    let data = first_data_line(body).ok_or(EnvelopeError::MissingData)?;
    let envelope: RpcEnvelope = serde_json::from_str(data)?;

    if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(EnvelopeError::Rpc { code, message });
    }

    Ok(envelope.result.unwrap_or(Value::Null))
}
