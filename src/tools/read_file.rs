//! Read file tool - reads a text file, optionally a line range

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

const BINARY_CHECK_SIZE: usize = 8192;

#[derive(Debug, Deserialize)]
struct Args {
    path: String,
    /// First line to return (1-indexed)
    #[serde(default, alias = "startLine")]
    start_line: Option<usize>,
    /// Last line to return (1-indexed, inclusive)
    #[serde(default, alias = "endLine")]
    end_line: Option<usize>,
}

pub struct ReadFileTool;

fn is_binary_file(path: &Path) -> std::io::Result<bool> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buffer = vec![0u8; BINARY_CHECK_SIZE];
    let bytes_read = file.read(&mut buffer)?;
    Ok(buffer[..bytes_read].contains(&0))
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read the contents of a file in the workspace. A line range can be given \
                          with start_line and end_line (1-indexed, inclusive)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the workspace root"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to read (optional)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to read (optional)"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        if ctx.is_cancelled() {
            return Err(ToolError::Failed("Cancelled".to_string()));
        }

        let args: Args = serde_json::from_value(args)?;
        let path = ctx.resolve_path(&args.path)?;

        if !path.is_file() {
            return Err(ToolError::Failed(format!("Not a file: {}", args.path)));
        }
        if is_binary_file(&path)? {
            return Err(ToolError::Failed(format!(
                "Binary file cannot be read as text: {}",
                args.path
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let start = args.start_line.unwrap_or(1).max(1);
        let end = args.end_line.unwrap_or(total_lines).min(total_lines);

        let selected = if start > end {
            String::new()
        } else {
            lines[start - 1..end].join("\n")
        };

        Ok(ToolOutput::new(selected).with_metadata(json!({
            "total_lines": total_lines,
            "range": format!("{}-{}", start, end),
        })))
    }
}
