pub mod executor;
pub mod file_ops;
pub mod patch;
pub mod profiles;
pub mod registry;
pub mod schema;
pub mod search;
pub mod shell;
pub mod traits;

use std::sync::Arc;

use crate::security::SecurityPolicy;

pub use executor::{ToolExecutor, ToolOutcome};
pub use file_ops::{FileListTool, FileReadTool, FileWriteTool};
pub use patch::PatchTool;
pub use profiles::{ToolGroup, ToolProfile};
pub use registry::ToolRegistry;
pub use schema::generate_tool_schema_text;
pub use search::SearchFilesTool;
pub use shell::ShellTool;
pub use traits::{Tool, ToolError, ToolInfo, ToolResult};

/// Register the core built-in tools (`shell`, `read_file`, `write_file`,
/// `file_list`, `search_files`, `patch_file`) into `registry`.
pub fn register_core_tools(registry: &mut ToolRegistry, policy: Arc<SecurityPolicy>) {
    registry.register(Arc::new(ShellTool::new(policy.clone())));
    registry.register(Arc::new(FileReadTool::new(policy.clone())));
    registry.register(Arc::new(FileWriteTool::new(policy.clone())));
    registry.register(Arc::new(FileListTool::new(policy.clone())));
    registry.register(Arc::new(SearchFilesTool::new(policy.clone())));
    registry.register(Arc::new(PatchTool::new(policy)));
}
