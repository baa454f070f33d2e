//! MineAgent - an LLM agent for authoring Minecraft Bedrock add-ons
//!
//! This crate provides:
//! - A think/act agent loop over OpenAI-compatible chat backends
//! - Workspace-confined file tools and a searchable knowledge base
//! - CLI/REPL interface for driving the agent

pub mod approval;
pub mod config;
pub mod message;
pub mod session;
pub mod telemetry;

// Agent system
pub mod agent;
pub mod events;
pub mod executor;
pub mod knowledge;
pub mod provider;
pub mod tool;
pub mod tools;

pub use config::Config;
pub use session::MineAgent;
pub use telemetry::Telemetry;

pub use agent::{AgentConfig, AgentLoop, CancelHandle, InteractionMode, PromptBuilder};
pub use approval::{AutoApprove, AutoApproving, ChannelHost, HostRequest};
pub use events::{event_channel, AgentEvent, EventReceiver, EventSender, RunOutcome, TaskState};
pub use executor::{ToolExecutionRequest, ToolExecutionResult, ToolExecutor};
pub use knowledge::KnowledgeEngine;
pub use message::{ChatMessage, Conversation, Role, ToolCall};
pub use provider::{Backend, LlmProvider, ProviderConfig, ProviderRegistry};
pub use tool::{Tool, ToolContext, ToolHost, ToolRegistry, ToolResult};
