//! Write file tool - creates or overwrites a file, creating parent directories

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Args {
    path: String,
    content: String,
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".to_string(),
            description: "Create a new file or overwrite an existing one. Missing parent \
                          directories are created automatically."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the workspace root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full file content"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: Args = serde_json::from_value(args)?;
        let path = ctx.resolve_path(&args.path)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &args.content)?;

        let size = args.content.chars().count();
        tracing::info!(path = %ctx.relative_display(&path), size, "File written");

        Ok(
            ToolOutput::new(format!("File written: {} ({} chars)", args.path, size))
                .with_metadata(json!({ "path": args.path, "size": size })),
        )
    }
}
