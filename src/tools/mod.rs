//! Tool system modules and re-exports.

pub mod library_docs;
pub mod registry;
pub mod resolve_library;
pub mod spec;

pub use library_docs::LIBRARY_DOCS_TOOL;
pub use registry::ToolRegistry;
pub use resolve_library::RESOLVE_LIBRARY_TOOL;
pub use spec::{ToolError, ToolSpec};

/// Namespace prefix on registered tool names, hidden from the client.
pub const TOOL_NAME_PREFIX: &str = "mcp__context7__";

/// Name shown to the client for a tool.
#[must_use]
pub fn display_name(name: &str) -> &str {
    name.strip_prefix(TOOL_NAME_PREFIX).unwrap_or(name)
}
