//! Events emitted by the turn driver.
//!
//! These flow from the driver task to whoever renders the run (the SSE
//! response or the `ask` subcommand) over a bounded channel.

use serde_json::Value;

/// One call listed in a tool-invocation notice.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Name with the server prefix stripped.
    pub name: String,
    /// Parsed arguments, or the raw argument string when it is not valid JSON.
    pub args: Value,
}

/// Events emitted by the driver, in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// One whitespace-delimited fragment of assistant text
    TextDelta { content: String },

    /// Every tool call of the current model response, sent once before any result
    ToolInvocation { calls: Vec<ToolInvocation> },

    /// Outcome of a single tool call
    ToolResult {
        name: String,
        content: String,
        is_error: bool,
    },

    // === Terminal ===
    /// The model answered without requesting tools.
    Done,

    /// The run failed; nothing follows.
    Error { message: String },
}

impl Event {
    pub fn text(content: impl Into<String>) -> Self {
        Self::TextDelta {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(Event::Done.is_terminal());
        assert!(Event::error("boom").is_terminal());
        assert!(!Event::text("hi").is_terminal());
        assert!(!Event::ToolInvocation { calls: Vec::new() }.is_terminal());
    }
}
