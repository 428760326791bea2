//! Registry of the tools offered to the model for one run.

use std::sync::Arc;

use super::library_docs::LibraryDocsTool;
use super::resolve_library::ResolveLibraryIdTool;
use super::spec::ToolSpec;
use crate::docs::DocsClient;
use crate::models::{FunctionDefinition, ToolDefinition};

/// Ordered set of tools keyed by name. Constant for the lifetime of a run.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolSpec>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the documentation tool pair for a caller. Without a credential
    /// the run proceeds as plain chat with no tools.
    #[must_use]
    pub fn for_credential(credential: Option<&str>, docs: &Arc<DocsClient>) -> Self {
        if credential.is_none_or(|c| c.trim().is_empty()) {
            return Self::empty();
        }
        let mut registry = Self::empty();
        registry.register(Arc::new(ResolveLibraryIdTool::new(docs.clone())));
        registry.register(Arc::new(LibraryDocsTool::new(docs.clone())));
        registry
    }

    /// Add a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolSpec>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolSpec>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Tool definitions in chat-completions shape, in registration order.
    #[must_use]
    pub fn to_api_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                kind: "function",
                function: FunctionDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.input_schema(),
                },
            })
            .collect()
    }
}
