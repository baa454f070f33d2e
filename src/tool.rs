//! Tool system
//!
//! Tools implement the `Tool` trait and are registered with `ToolRegistry`.
//! The registry hands its schema catalog to the provider; `ToolExecutor`
//! dispatches requested calls against it.

use crate::agent::CancelHandle;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Tool definition for LLM (name, description, JSON schema)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool definition in the OpenAI `tools` wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolDefinition,
}

impl From<ToolDefinition> for ToolSchema {
    fn from(function: ToolDefinition) -> Self {
        Self {
            kind: "function".to_string(),
            function,
        }
    }
}

/// Successful tool output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Result of dispatching a tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Ok(ToolOutput),
    Failed { reason: String },
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        ToolResult::Ok(ToolOutput::new(output))
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        ToolResult::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Ok(_))
    }

    /// Text fed back to the model
    pub fn output(&self) -> &str {
        match self {
            ToolResult::Ok(out) => &out.output,
            ToolResult::Failed { reason } => reason,
        }
    }

    pub fn metadata(&self) -> Option<&Value> {
        match self {
            ToolResult::Ok(out) => out.metadata.as_ref(),
            ToolResult::Failed { .. } => None,
        }
    }
}

impl From<ToolOutput> for ToolResult {
    fn from(output: ToolOutput) -> Self {
        ToolResult::Ok(output)
    }
}

/// Errors raised inside a tool body
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Path is outside workspace: {0}")]
    OutsideWorkspace(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}

/// Callbacks provided by the host application
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Ask the user a question and wait for the answer
    async fn ask_user(&self, question: &str) -> String;

    /// Report progress of a multi-step operation
    fn report_progress(&self, step: usize, total: usize, description: &str);

    /// Ask the host to approve an action; resolves once a decision exists
    async fn request_approval(&self, description: &str, details: &str, diff: Option<&str>)
        -> bool;
}

/// Context passed to tools during execution
#[derive(Clone)]
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub project_path: Option<PathBuf>,
    pub host: Arc<dyn ToolHost>,
    pub cancellation: CancelHandle,
}

impl ToolContext {
    pub fn new(workspace_root: PathBuf, host: Arc<dyn ToolHost>) -> Self {
        Self {
            workspace_root,
            project_path: None,
            host,
            cancellation: CancelHandle::new(),
        }
    }

    pub fn with_project_path(mut self, project_path: PathBuf) -> Self {
        self.project_path = Some(project_path);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancelHandle) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn ToolHost>) -> Self {
        self.host = host;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolve a path against the workspace root, rejecting anything that
    /// escapes it, including through symlinks. The target does not need to
    /// exist.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        let root = self
            .workspace_root
            .canonicalize()
            .unwrap_or_else(|_| normalize(&self.workspace_root));

        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };
        let resolved = normalize(&joined);

        if !resolved.starts_with(&root) {
            return Err(ToolError::OutsideWorkspace(path.to_string()));
        }

        match canonicalize_existing(&resolved) {
            Some(real) if real.starts_with(&root) => Ok(real),
            _ => {
                tracing::warn!(path, "Path escapes the workspace through a link");
                Err(ToolError::OutsideWorkspace(path.to_string()))
            }
        }
    }

    /// Path relative to the workspace root, for display
    pub fn relative_display(&self, path: &Path) -> String {
        let root = self
            .workspace_root
            .canonicalize()
            .unwrap_or_else(|_| normalize(&self.workspace_root));
        path.strip_prefix(&root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-attach the
/// components that do not exist yet. `None` for a dangling symlink, whose
/// target cannot be checked.
fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
    for ancestor in path.ancestors() {
        match ancestor.canonicalize() {
            Ok(canonical) => {
                let rest = path.strip_prefix(ancestor).ok()?;
                return Some(if rest.as_os_str().is_empty() {
                    canonical
                } else {
                    canonical.join(rest)
                });
            }
            Err(_) if ancestor.symlink_metadata().is_ok() => return None,
            Err(_) => continue,
        }
    }
    Some(path.to_path_buf())
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// A named, schema-described operation the model may request
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used for dispatch)
    fn name(&self) -> &str;

    /// Get the tool definition for LLM
    fn definition(&self) -> ToolDefinition;

    /// Whether the host must approve each call before it runs
    fn requires_approval(&self) -> bool {
        false
    }

    /// Execute the tool with given arguments
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

/// Registry configuration errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

/// Registry of available tools, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second tool with the same name is rejected.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// List all tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schema catalog handed to the provider
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema::from(t.definition()))
            .collect()
    }

    /// Unknown tools are treated as requiring approval
    pub fn requires_approval(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .map(|t| t.requires_approval())
            .unwrap_or(true)
    }

    /// (name, description) pairs for capability listings
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|t| {
                let def = t.definition();
                (def.name, def.description)
            })
            .collect()
    }
}

/// Check arguments against the subset of JSON Schema tools declare:
/// object type, required keys and primitive property types.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !args.is_object() {
        return Err("arguments must be a JSON object".to_string());
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            match args.get(key) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required property '{}'", key))
                }
                Some(_) => {}
            }
        }
    }

    let (Some(properties), Some(values)) = (
        schema.get("properties").and_then(|p| p.as_object()),
        args.as_object(),
    ) else {
        return Ok(());
    };

    for (key, value) in values {
        if value.is_null() {
            continue;
        }
        let Some(expected) = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        let matches = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(format!("property '{}' must be of type {}", key, expected));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AutoApprove;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.to_string(),
                description: "Echo the input".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            }
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::new(args["text"].as_str().unwrap_or_default()))
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo("echo")).unwrap();
        let err = registry.register(Echo("echo")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool(ref n) if n == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_schemas_preserve_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo("b")).unwrap();
        registry.register(Echo("a")).unwrap();

        let schemas = registry.schemas();
        assert_eq!(schemas[0].function.name, "b");
        assert_eq!(schemas[1].function.name, "a");

        let json = serde_json::to_value(&schemas[0]).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["parameters"]["required"][0], "text");
    }

    #[test]
    fn test_unknown_tool_requires_approval() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo("echo")).unwrap();
        assert!(!registry.requires_approval("echo"));
        assert!(registry.requires_approval("missing"));
    }

    #[test]
    fn test_validate_arguments() {
        let schema = json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "recursive": { "type": "boolean" },
                "limit": { "type": "integer" }
            },
            "required": ["path"]
        });

        assert!(validate_arguments(&schema, &json!({"path": "a"})).is_ok());
        assert!(validate_arguments(&schema, &json!({"path": "a", "extra": 1})).is_ok());

        let err = validate_arguments(&schema, &json!({})).unwrap_err();
        assert!(err.contains("'path'"));

        let err = validate_arguments(&schema, &json!({"path": "a", "recursive": "yes"})).unwrap_err();
        assert!(err.contains("boolean"));

        let err = validate_arguments(&schema, &json!({"path": "a", "limit": 1.5})).unwrap_err();
        assert!(err.contains("integer"));

        assert!(validate_arguments(&schema, &json!(["a"])).is_err());
    }

    #[test]
    fn test_resolve_path_confined_to_workspace() {
        let temp = tempfile::TempDir::new().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), Arc::new(AutoApprove));

        let inside = ctx.resolve_path("packs/bp/manifest.json").unwrap();
        assert!(inside.ends_with("packs/bp/manifest.json"));

        let dotted = ctx.resolve_path("packs/../readme.md").unwrap();
        assert!(dotted.ends_with("readme.md"));

        assert!(matches!(
            ctx.resolve_path("../outside.txt"),
            Err(ToolError::OutsideWorkspace(_))
        ));
        assert!(ctx.resolve_path("/etc/passwd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_path_rejects_symlink_escape() {
        use std::os::unix::fs::symlink;

        let outside = tempfile::TempDir::new().unwrap();
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("packs")).unwrap();
        symlink(outside.path(), root.join("link")).unwrap();
        symlink(root.join("packs"), root.join("packs_alias")).unwrap();
        symlink(outside.path().join("missing.txt"), root.join("dangling")).unwrap();

        let ctx = ToolContext::new(root.to_path_buf(), Arc::new(AutoApprove));

        assert!(matches!(
            ctx.resolve_path("link/escaped.txt"),
            Err(ToolError::OutsideWorkspace(_))
        ));
        assert!(matches!(ctx.resolve_path("link"), Err(ToolError::OutsideWorkspace(_))));
        assert!(matches!(ctx.resolve_path("dangling"), Err(ToolError::OutsideWorkspace(_))));

        let aliased = ctx.resolve_path("packs_alias/new/item.json").unwrap();
        assert_eq!(aliased, root.canonicalize().unwrap().join("packs/new/item.json"));
        assert!(!outside.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_tool_result_accessors() {
        let ok = ToolResult::from(ToolOutput::new("done").with_metadata(json!({"n": 1})));
        assert!(ok.is_success());
        assert_eq!(ok.output(), "done");
        assert_eq!(ok.metadata().unwrap()["n"], 1);

        let failed = ToolResult::failed("nope");
        assert!(!failed.is_success());
        assert_eq!(failed.output(), "nope");
        assert!(failed.metadata().is_none());
    }
}
