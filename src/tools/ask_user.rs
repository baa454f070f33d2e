//! Ask user tool - asks the user a question and waits for the answer

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Output when the user dismissed the question
pub const NO_ANSWER: &str = "(The user cancelled the question without answering)";

#[derive(Debug, Deserialize)]
struct Args {
    question: String,
}

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ask_user".to_string(),
            description: "Ask the user a question and get their answer. Use it to clarify \
                          unclear requirements or to offer choices."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "Question for the user"
                    }
                },
                "required": ["question"]
            }),
        }
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: Args = serde_json::from_value(args)?;
        let answer = ctx.host.ask_user(&args.question).await;

        if answer.trim().is_empty() {
            return Ok(ToolOutput::new(NO_ANSWER));
        }
        Ok(ToolOutput::new(answer))
    }
}
