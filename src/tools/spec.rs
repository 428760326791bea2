//! Tool trait and shared error/argument helpers.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::docs::RemoteServiceError;

/// Why a tool invocation produced no result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {message}")]
    InvalidInput { message: String },
    #[error("Missing required field: {field}")]
    MissingField { field: String },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
    #[error("{message}")]
    ExecutionFailed { message: String },
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }
}

/// A named, schema-described remote operation the model may request.
///
/// `execute` returns the tool's raw JSON result. That value is recorded in the
/// conversation verbatim; display shaping happens elsewhere.
#[async_trait]
pub trait ToolSpec: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the argument object.
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

pub fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    match input.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(ToolError::missing_field(field)),
        Some(_) => Err(ToolError::invalid_input(format!("'{field}' must be a string"))),
    }
}

#[must_use]
pub fn optional_str<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input.get(field).and_then(Value::as_str)
}
