//! Step one of a documentation lookup: library name to Context7 ID.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::spec::{ToolError, ToolSpec, required_str};
use crate::docs::DocsClient;

pub const RESOLVE_LIBRARY_TOOL: &str = "mcp__context7__resolve-library-id";

pub struct ResolveLibraryIdTool {
    docs: Arc<DocsClient>,
}

impl ResolveLibraryIdTool {
    pub fn new(docs: Arc<DocsClient>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl ToolSpec for ResolveLibraryIdTool {
    fn name(&self) -> &'static str {
        RESOLVE_LIBRARY_TOOL
    }

    fn description(&self) -> &'static str {
        "Step 1: Finds a Context7-compatible library ID for a given library name. Use this to find the ID before fetching docs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "libraryName": {
                    "type": "string",
                    "description": "Library name to search for and retrieve a Context7-compatible library ID."
                }
            },
            "required": ["libraryName"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let library_name = required_str(&input, "libraryName")?;
        tracing::info!(library_name, "Resolving library id");
        Ok(self.docs.resolve_library_id(library_name).await?)
    }
}
