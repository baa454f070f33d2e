//! System prompt construction
//!
//! Base prompt (project override or built-in template) followed by phase
//! guidance, the interaction mode, the tool catalog and knowledge found for
//! the user's message.

use super::InteractionMode;
use crate::knowledge::{KnowledgeEngine, SearchOptions};
use crate::tool::ToolRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Project-level override for the base prompt, relative to the workspace
pub const PROMPT_OVERRIDE_PATH: &str = ".mine-agent/prompt.md";

/// Built-in base prompt
pub fn default_base_prompt() -> &'static str {
    include_str!("../prompts/system.md")
}

/// Per-build inputs
#[derive(Debug, Clone, Default)]
pub struct PromptOptions<'a> {
    pub phase_guidance: Option<&'a str>,
    pub interaction_mode: InteractionMode,
    /// Searched against the knowledge base; results are injected
    pub user_message: Option<&'a str>,
}

pub struct PromptBuilder {
    workspace_root: PathBuf,
    engine: Arc<KnowledgeEngine>,
    target_version: String,
    knowledge_results: usize,
    tools: Vec<(String, String)>,
}

impl PromptBuilder {
    pub fn new(workspace_root: impl Into<PathBuf>, engine: Arc<KnowledgeEngine>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            engine,
            target_version: "1.21.0".to_string(),
            knowledge_results: 2,
            tools: Vec::new(),
        }
    }

    pub fn with_target_version(mut self, version: impl Into<String>) -> Self {
        self.target_version = version.into();
        self
    }

    /// How many search results to inject (0 disables injection)
    pub fn with_knowledge_results(mut self, count: usize) -> Self {
        self.knowledge_results = count;
        self
    }

    pub fn with_tools(mut self, registry: &ToolRegistry) -> Self {
        self.tools = registry.descriptions();
        self
    }

    pub fn build(&self, options: &PromptOptions<'_>) -> String {
        let mut prompt = load_base_prompt(&self.workspace_root);

        if let Some(guidance) = options.phase_guidance.filter(|g| !g.trim().is_empty()) {
            prompt.push_str(&format!("\n\n## Current phase\n{}", guidance));
        }

        prompt.push_str(&format!(
            "\n\n## Current interaction mode: {}",
            options.interaction_mode
        ));

        if !self.tools.is_empty() {
            prompt.push_str("\n\n## Available tools\n");
            let lines: Vec<String> = self
                .tools
                .iter()
                .map(|(name, description)| format!("- `{}`: {}", name, first_line(description)))
                .collect();
            prompt.push_str(&lines.join("\n"));
        }

        if let Some(knowledge) = options
            .user_message
            .and_then(|message| self.relevant_knowledge(message))
        {
            prompt.push_str(
                "\n\n## Reference knowledge (auto-retrieved)\n\
                 The following is specification information related to the request. \
                 Base your answer on it.\n\n",
            );
            prompt.push_str(&knowledge);
        }

        prompt
    }

    fn relevant_knowledge(&self, message: &str) -> Option<String> {
        if self.knowledge_results == 0 {
            return None;
        }

        let options = SearchOptions::new()
            .with_max_results(self.knowledge_results)
            .with_target_version(self.target_version.clone());
        let results = self.engine.search(message, &options);
        tracing::debug!(results = results.len(), "Knowledge injected into prompt");

        if results.is_empty() {
            return None;
        }
        Some(KnowledgeEngine::format_search_results(&results))
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Project override if present and readable, else the built-in template
fn load_base_prompt(workspace_root: &Path) -> String {
    let path = workspace_root.join(PROMPT_OVERRIDE_PATH);
    match std::fs::read_to_string(&path) {
        Ok(content) if !content.trim().is_empty() => {
            tracing::debug!(path = %path.display(), "Using project prompt override");
            content
        }
        _ => default_base_prompt().to_string(),
    }
}
