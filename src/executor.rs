//! Tool dispatch
//!
//! Resolves requested calls against the registry, runs the approval
//! round-trip, executes, and normalizes every failure into a
//! `ToolResult::Failed`. Nothing a tool does escapes to the agent loop.

use crate::message::ToolCall;
use crate::tool::{validate_arguments, ToolContext, ToolDefinition, ToolRegistry, ToolResult};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Output for a call the host declined
pub const REJECTED_MESSAGE: &str = "User rejected the action.";

/// A tool invocation to dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionRequest {
    pub call_id: String,
    pub tool_name: String,
    /// Raw argument string as streamed by the model
    pub arguments: String,
}

impl From<&ToolCall> for ToolExecutionRequest {
    fn from(call: &ToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        }
    }
}

/// Outcome of one dispatched call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionResult {
    pub call_id: String,
    pub tool_name: String,
    pub result: ToolResult,
}

/// Executes tool calls one at a time against a registry
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Execute a single request
    pub async fn execute(&self, request: ToolExecutionRequest) -> ToolExecutionResult {
        let result = self.dispatch(&request).await;

        if result.is_success() {
            tracing::debug!(tool = %request.tool_name, call_id = %request.call_id, "Tool call succeeded");
        } else {
            tracing::info!(
                tool = %request.tool_name,
                call_id = %request.call_id,
                reason = %result.output(),
                "Tool call failed"
            );
        }

        ToolExecutionResult {
            call_id: request.call_id,
            tool_name: request.tool_name,
            result,
        }
    }

    /// Execute requests strictly in order; each finishes before the next starts
    pub async fn execute_all(&self, requests: Vec<ToolExecutionRequest>) -> Vec<ToolExecutionResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.execute(request).await);
        }
        results
    }

    async fn dispatch(&self, request: &ToolExecutionRequest) -> ToolResult {
        let Some(tool) = self.registry.get(&request.tool_name) else {
            return ToolResult::failed(format!("Unknown tool: {}", request.tool_name));
        };

        let args = match parse_arguments(&request.arguments) {
            Ok(args) => args,
            Err(e) => {
                return ToolResult::failed(format!(
                    "Invalid arguments for {}: {}",
                    request.tool_name, e
                ))
            }
        };

        let definition = tool.definition();
        if let Err(e) = validate_arguments(&definition.parameters, &args) {
            return ToolResult::failed(format!("Invalid arguments for {}: {}", request.tool_name, e));
        }

        if tool.requires_approval() {
            let description = format!("Tool execution: {}", definition.name);
            let details = describe_call(&definition, &args);
            let approved = self
                .context
                .host
                .request_approval(&description, &details, None)
                .await;
            tracing::info!(tool = %request.tool_name, approved, "Approval decision");
            if !approved {
                return ToolResult::failed(REJECTED_MESSAGE);
            }
        }

        match AssertUnwindSafe(tool.execute(args, &self.context))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => ToolResult::Ok(output),
            Ok(Err(e)) => ToolResult::failed(format!("Tool execution error: {}", e)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                ToolResult::failed(format!("Tool execution error: {}", message))
            }
        }
    }
}

/// Empty argument strings are read as `{}`
fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

/// Human-readable summary shown to whoever approves the call
fn describe_call(definition: &ToolDefinition, args: &Value) -> String {
    let mut lines = vec![
        format!("Tool: {}", definition.name),
        format!("Description: {}", definition.description),
        "Parameters:".to_string(),
    ];
    if let Some(map) = args.as_object() {
        for (key, value) in map {
            let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            lines.push(format!("  {}: {}", key, rendered));
        }
    }
    lines.join("\n")
}
