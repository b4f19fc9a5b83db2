//! Tool execution.
//!
//! Tools are keyed by name and take a structured JSON argument tree.  Every
//! call produces a JSON value; failures are reported *inside* that value as
//! `{"error": "..."}` so the model can observe them and still produce a
//! useful final answer; transport-level errors would end the conversation
//! instead.

mod fs;

use async_trait::async_trait;

pub use fs::FsToolExecutor;

/// A pluggable tool backend.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with `arguments`.  Never fails at the transport level;
    /// problems come back as an `{"error": ...}` value.
    async fn execute(&self, name: &str, arguments: &serde_json::Value) -> serde_json::Value;
}

/// One entry of the always-available built-in catalog.
pub struct BuiltinTool {
    pub name: &'static str,
    /// Parameter docstring shown to the model.
    pub params: &'static str,
}

/// The fixed built-in file-operation catalog advertised to the model on
/// every tool-enabled request.
pub const BUILTIN_TOOLS: &[BuiltinTool] = &[
    BuiltinTool {
        name: "read_file",
        params: "path (string, required), max_bytes (integer, optional, default 1048576)",
    },
    BuiltinTool {
        name: "write_file",
        params: "path (string, required), content (string, required)",
    },
    BuiltinTool {
        name: "edit_file",
        params: "path (string, required), new_text (string, required), \
                 one of: old_text (string) or line_number (integer, 1-based)",
    },
    BuiltinTool {
        name: "delete_file",
        params: "path (string, required), recursive (boolean, optional)",
    },
    BuiltinTool {
        name: "move_file",
        params: "source_path (string, required), destination_path (string, required)",
    },
    BuiltinTool {
        name: "copy_file",
        params: "source_path (string, required), destination_path (string, required)",
    },
    BuiltinTool {
        name: "list_directory",
        params: "path (string, required), recursive (boolean, optional), \
                 include_hidden (boolean, optional)",
    },
    BuiltinTool {
        name: "create_directory",
        params: "path (string, required)",
    },
    BuiltinTool {
        name: "check_path",
        params: "path (string, required)",
    },
];
