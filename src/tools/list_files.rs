//! List files tool - lists a workspace directory, optionally recursive

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

/// Deepest level listed below the requested directory
const MAX_DEPTH: usize = 5;
const MAX_ENTRIES: usize = 200;
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    recursive: bool,
    /// Glob applied to file names; directories are always listed
    #[serde(default)]
    pattern: Option<String>,
}

pub struct ListFilesTool;

struct Listing<'a> {
    ctx: &'a ToolContext,
    pattern: Option<glob::Pattern>,
    recursive: bool,
    entries: Vec<String>,
    truncated: bool,
}

impl Listing<'_> {
    fn walk(&mut self, dir: &Path, depth: usize) -> std::io::Result<()> {
        let mut items: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        items.sort_by_key(|e| e.file_name());

        for item in items {
            if self.entries.len() >= MAX_ENTRIES {
                self.truncated = true;
                return Ok(());
            }

            let name = item.file_name();
            let name = name.to_string_lossy();
            if SKIPPED_DIRS.contains(&name.as_ref()) {
                continue;
            }

            let path = item.path();
            let is_dir = path.is_dir();

            if let Some(pattern) = &self.pattern {
                if !is_dir && !pattern.matches(&name) {
                    continue;
                }
            }

            let suffix = if is_dir { "/" } else { "" };
            self.entries
                .push(format!("{}{}", self.ctx.relative_display(&path), suffix));

            if is_dir && self.recursive && depth < MAX_DEPTH {
                self.walk(&path, depth + 1)?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_files".to_string(),
            description: "List files and subdirectories of a workspace directory. Directories end \
                          with '/'. Optionally recursive, optionally filtered by a glob on file names \
                          (e.g. '*.json')."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory relative to the workspace root (defaults to the root)"
                    },
                    "recursive": {
                        "type": "boolean",
                        "description": "List subdirectories too (default: false)"
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern for file names (optional)"
                    }
                }
            }),
        }
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        if ctx.is_cancelled() {
            return Err(ToolError::Failed("Cancelled".to_string()));
        }

        let args: Args = serde_json::from_value(args)?;
        let requested = args.path.as_deref().filter(|p| !p.is_empty()).unwrap_or(".");
        let dir = ctx.resolve_path(requested)?;

        if !dir.is_dir() {
            return Err(ToolError::Failed(format!("Not a directory: {}", requested)));
        }

        let pattern = match args.pattern.as_deref() {
            Some(p) => Some(
                glob::Pattern::new(p)
                    .map_err(|e| ToolError::InvalidArguments(format!("bad pattern '{}': {}", p, e)))?,
            ),
            None => None,
        };

        let mut listing = Listing {
            ctx,
            pattern,
            recursive: args.recursive,
            entries: Vec::new(),
            truncated: false,
        };
        listing.walk(&dir, 1)?;

        let count = listing.entries.len();
        let mut output = if listing.entries.is_empty() {
            "(empty directory)".to_string()
        } else {
            listing.entries.join("\n")
        };
        if listing.truncated {
            output.push_str(&format!("\n... (truncated at {} entries)", MAX_ENTRIES));
        }

        Ok(ToolOutput::new(output).with_metadata(json!({
            "count": count,
            "truncated": listing.truncated,
        })))
    }
}
