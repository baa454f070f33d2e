//! Agent assembly - wires configuration, knowledge, tools and a provider
//! into a ready-to-run `AgentLoop`

use crate::agent::{AgentLoop, CancelHandle, PromptBuilder, PromptOptions};
use crate::approval::AutoApproving;
use crate::config::{Config, PROJECT_CONFIG_PATH};
use crate::events::{EventSender, RunOutcome, TaskState};
use crate::knowledge::KnowledgeEngine;
use crate::provider::{LlmProvider, ProviderRegistry};
use crate::tool::{ToolContext, ToolHost, ToolRegistry};
use crate::tools::create_registry;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main MineAgent session
pub struct MineAgent {
    config: Config,
    workspace: PathBuf,
    engine: Arc<KnowledgeEngine>,
    registry: Arc<ToolRegistry>,
    providers: ProviderRegistry,
    provider: Arc<dyn LlmProvider>,
    prompts: PromptBuilder,
    phase_guidance: Option<String>,
    agent: AgentLoop,
}

impl MineAgent {
    /// Build a session for `workspace`, creating the provider from `config`
    pub fn new(
        config: Config,
        workspace: PathBuf,
        host: Arc<dyn ToolHost>,
        events: EventSender,
    ) -> Result<Self> {
        if config.provider.model.trim().is_empty() {
            anyhow::bail!(
                "No model configured for the {} backend: set provider.model in {} or pass --model",
                config.provider.backend.id(),
                PROJECT_CONFIG_PATH
            );
        }

        let providers = ProviderRegistry::new();
        let provider = providers
            .create(&config.provider)
            .with_context(|| format!("Failed to create {} provider", config.provider.backend.id()))?;
        Self::assemble(config, workspace, host, events, providers, provider)
    }

    /// Build a session around an existing provider
    pub fn with_provider(
        config: Config,
        workspace: PathBuf,
        host: Arc<dyn ToolHost>,
        events: EventSender,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        Self::assemble(config, workspace, host, events, ProviderRegistry::new(), provider)
    }

    fn assemble(
        config: Config,
        workspace: PathBuf,
        host: Arc<dyn ToolHost>,
        events: EventSender,
        providers: ProviderRegistry,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let engine = Arc::new(KnowledgeEngine::load(config.knowledge_dir(&workspace)));

        let registry = Arc::new(
            create_registry(
                engine.clone(),
                &config.knowledge.target_version,
                config.knowledge.tool_results,
            )
            .context("Failed to register tools")?,
        );

        let host: Arc<dyn ToolHost> = if config.agent.auto_approve {
            Arc::new(AutoApproving::new(host))
        } else {
            host
        };
        let context = ToolContext::new(workspace.clone(), host).with_project_path(workspace.clone());

        let prompts = PromptBuilder::new(workspace.clone(), engine.clone())
            .with_target_version(config.knowledge.target_version.clone())
            .with_knowledge_results(config.knowledge.prompt_results)
            .with_tools(&registry);

        let agent = AgentLoop::new(
            provider.clone(),
            registry.clone(),
            context,
            prompts.build(&PromptOptions::default()),
            config.agent.clone(),
            events,
        );

        tracing::info!(
            workspace = %workspace.display(),
            backend = provider.id(),
            model = %config.provider.model,
            tools = registry.len(),
            documents = engine.len(),
            "Agent assembled"
        );

        Ok(Self {
            config,
            workspace,
            engine,
            registry,
            providers,
            provider,
            prompts,
            phase_guidance: None,
            agent,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn engine(&self) -> &Arc<KnowledgeEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn state(&self) -> TaskState {
        self.agent.state()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.agent.cancel_handle()
    }

    /// Guidance appended to the system prompt of the next conversation
    pub fn set_phase_guidance(&mut self, guidance: Option<String>) {
        self.phase_guidance = guidance;
    }

    /// Send a message. The first message of a conversation also decides
    /// which knowledge is injected into the system prompt.
    pub async fn send(&mut self, message: &str) -> RunOutcome {
        if self.agent.history_len() == 0 {
            let prompt = self.prompts.build(&PromptOptions {
                phase_guidance: self.phase_guidance.as_deref(),
                interaction_mode: self.config.agent.interaction_mode,
                user_message: Some(message),
            });
            self.agent.set_system_prompt(prompt);
        }
        self.agent.run(message).await
    }

    /// Forget the conversation; the next `send` starts fresh
    pub fn reset(&mut self) {
        self.agent.reset();
    }

    /// Re-read the knowledge directory, returning the document count
    pub fn reload_knowledge(&self) -> usize {
        self.engine.reload()
    }

    pub fn dispose(&self) {
        self.providers.dispose_all();
        self.provider.dispose();
        self.engine.dispose();
    }
}
