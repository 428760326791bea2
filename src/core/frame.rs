//! Output framer: turns driver events into `data:` frame payloads.
//!
//! Payload shapes follow the OpenAI streaming delta layout the browser client
//! already understands:
//!
//! - `{"choices":[{"delta":{"content":"..."}}]}`
//! - `{"choices":[{"delta":{"tool_execution":[{"name":..,"args":..}]}}]}`
//! - `{"choices":[{"delta":{"tool_result":{"name":..,"content":..,"error":true}}}]}`
//! - `{"error":"..."}`
//! - `[DONE]`

use serde_json::{Value, json};

use super::events::Event;

/// Literal completion sentinel.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Payload of one frame, without the `data: ` prefix.
#[must_use]
pub fn payload(event: &Event) -> String {
    match event {
        Event::TextDelta { content } => delta(json!({ "content": content })),
        Event::ToolInvocation { calls } => {
            let calls: Vec<Value> = calls
                .iter()
                .map(|call| json!({ "name": call.name, "args": call.args }))
                .collect();
            delta(json!({ "tool_execution": calls }))
        }
        Event::ToolResult {
            name,
            content,
            is_error,
        } => {
            let mut result = json!({ "name": name, "content": content });
            if *is_error {
                result["error"] = Value::Bool(true);
            }
            delta(json!({ "tool_result": result }))
        }
        Event::Done => DONE_SENTINEL.to_string(),
        Event::Error { message } => json!({ "error": message }).to_string(),
    }
}

/// Complete wire frame: `data: <payload>\n\n`.
#[must_use]
pub fn encode(event: &Event) -> String {
    format!("data: {}\n\n", payload(event))
}

fn delta(delta: Value) -> String {
    json!({ "choices": [{ "delta": delta }] }).to_string()
}

/// Stateful framer for one run. Once a terminal event has been framed it
/// refuses everything else.
#[derive(Debug, Default)]
pub struct OutputFramer {
    closed: bool,
}

impl OutputFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame payload for `event`, or `None` if the stream is already closed.
    pub fn frame(&mut self, event: &Event) -> Option<String> {
        if self.closed {
            tracing::debug!(?event, "Dropping event after terminal frame");
            return None;
        }
        self.closed = event.is_terminal();
        Some(payload(event))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
