//! Request/response models for the OpenAI-compatible chat-completions API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MODEL: &str = "moonshotai/kimi-k2-instruct";
/// Output budget requested on every model call.
pub const MAX_OUTPUT_TOKENS: u32 = 8000;
pub const TEMPERATURE: f64 = 0.2;
pub const FINISH_REASON_TOOL_CALLS: &str = "tool_calls";

// === Conversation Turns ===

/// Role of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the conversation, serialized in chat-completions shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// A tool-role turn answering the call `call_id`.
    pub fn tool(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Text content, treating a missing body as empty.
    #[must_use]
    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A turn as submitted by the browser client. Role and content may be any
/// JSON value; entries without a usable role are dropped, not rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingTurn {
    #[serde(default)]
    pub role: Value,
    #[serde(default)]
    pub content: Value,
}

impl IncomingTurn {
    /// Convert to a conversation turn. Only `user` and `assistant` turns are
    /// accepted from the client; everything else is dropped.
    #[must_use]
    pub fn into_turn(self) -> Option<Turn> {
        let content = match self.content {
            Value::String(text) => text,
            other => other.to_string(),
        };
        match self.role.as_str()? {
            "user" => Some(Turn::user(content)),
            "assistant" => Some(Turn::assistant(content)),
            _ => None,
        }
    }
}

// === Tool Calls ===

/// A model-issued request to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCallRequest {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Parse the argument blob. An empty blob is an empty object.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(raw)
    }
}

// === Requests ===

/// Tool definition in chat-completions shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Request body for `POST /chat/completions`, borrowing the turn log.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Turn],
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
}

impl<'a> ChatRequest<'a> {
    /// Build a request with the fixed sampling parameters. Tools are attached,
    /// with `tool_choice = "auto"`, only when there are any.
    #[must_use]
    pub fn new(model: &'a str, messages: &'a [Turn], tools: &'a [ToolDefinition]) -> Self {
        let tools = (!tools.is_empty()).then_some(tools);
        Self {
            model,
            messages,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            stream: false,
            tool_choice: tools.map(|_| "auto"),
            tools,
        }
    }
}

// === Responses ===

/// Non-streaming chat-completions response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: Turn,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl Choice {
    /// Whether the model stopped to ask for tool execution.
    #[must_use]
    pub fn requests_tools(&self) -> bool {
        self.finish_reason.as_deref() == Some(FINISH_REASON_TOOL_CALLS)
            && !self.message.tool_calls.is_empty()
    }
}
