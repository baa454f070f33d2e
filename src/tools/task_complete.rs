//! Task complete tool - signals task completion
//!
//! The agent loop ends the run when it sees this tool among a cycle's calls
//! and reports the returned summary.

use crate::agent::TASK_COMPLETE_TOOL;
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Args {
    summary: String,
}

pub struct TaskCompleteTool;

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &str {
        TASK_COMPLETE_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TASK_COMPLETE_TOOL.to_string(),
            description: "Call when the task is complete. Provide a summary of what was done."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Summary of what was accomplished"
                    }
                },
                "required": ["summary"]
            }),
        }
    }

    async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: Args = serde_json::from_value(args)?;
        Ok(ToolOutput::new(args.summary))
    }
}
