//! Step two of a documentation lookup: fetch docs for a resolved ID.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::spec::{ToolError, ToolSpec, optional_str, required_str};
use crate::docs::{DEFAULT_DOC_TOKENS, DocsClient};

pub const LIBRARY_DOCS_TOOL: &str = "mcp__context7__get-library-docs";

pub struct LibraryDocsTool {
    docs: Arc<DocsClient>,
}

impl LibraryDocsTool {
    pub fn new(docs: Arc<DocsClient>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl ToolSpec for LibraryDocsTool {
    fn name(&self) -> &'static str {
        LIBRARY_DOCS_TOOL
    }

    fn description(&self) -> &'static str {
        "Step 2: Fetches up-to-date documentation for a library given its Context7-compatible ID. IMPORTANT: You must use `mcp__context7__resolve-library-id` first to get the `context7CompatibleLibraryID`."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "context7CompatibleLibraryID": {
                    "type": "string",
                    "description": "Exact Context7-compatible library ID (e.g., '/mongodb/docs', '/vercel/next.js')"
                },
                "tokens": {
                    "type": "number",
                    "description": "Maximum number of tokens of documentation to retrieve (default: 10000)"
                },
                "topic": {
                    "type": "string",
                    "description": "Topic to focus documentation on (e.g., 'hooks', 'routing')"
                }
            },
            "required": ["context7CompatibleLibraryID"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let library_id = required_str(&input, "context7CompatibleLibraryID")?;
        let topic = optional_str(&input, "topic");
        // A model-supplied `tokens` is ignored; the budget is fixed.
        tracing::info!(
            library_id,
            ?topic,
            tokens = DEFAULT_DOC_TOKENS,
            "Fetching library documentation"
        );

        let docs = self.docs.fetch_documentation(library_id, topic).await?;
        serde_json::to_value(&docs).map_err(|e| ToolError::execution_failed(e.to_string()))
    }
}
