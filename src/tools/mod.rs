//! Built-in tools
//!
//! Each tool implements `crate::tool::Tool`. File tools are confined to the
//! workspace root of the `ToolContext` they run with.

mod ask_user;
mod list_files;
mod query_knowledge;
mod read_file;
mod task_complete;
mod write_file;

pub use ask_user::AskUserTool;
pub use list_files::ListFilesTool;
pub use query_knowledge::QueryKnowledgeTool;
pub use read_file::ReadFileTool;
pub use task_complete::TaskCompleteTool;
pub use write_file::WriteFileTool;

use crate::knowledge::KnowledgeEngine;
use crate::tool::{RegistryError, ToolRegistry};
use std::sync::Arc;

/// Create a registry with all standard tools
pub fn create_registry(
    engine: Arc<KnowledgeEngine>,
    target_version: &str,
    knowledge_results: usize,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(ReadFileTool)?;
    registry.register(WriteFileTool)?;
    registry.register(ListFilesTool)?;
    registry.register(AskUserTool)?;
    registry.register(
        QueryKnowledgeTool::new(engine)
            .with_target_version(target_version)
            .with_max_results(knowledge_results),
    )?;
    registry.register(TaskCompleteTool)?;

    Ok(registry)
}
