//! LLM Provider layer
//!
//! A provider is a pure HTTP client for a chat-completion backend. The agent
//! loop only sees the `LlmProvider` trait: a lazy stream of completion chunks
//! keyed by tool-call id, or one complete response.

mod backend;
mod client;
mod config;
mod decoder;
mod registry;

pub use backend::Backend;
pub use client::OpenAiCompatibleProvider;
pub use config::ProviderConfig;
pub use decoder::{StreamDecoder, WireFormat};
pub use registry::ProviderRegistry;

use crate::message::{ChatMessage, ToolCall};
use crate::tool::ToolSchema;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Errors raised by providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM request failed ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

/// A chat-completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Tool catalog; empty means no tools are offered
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Incremental piece of one tool call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Call id; every fragment of the same call carries the same id
    pub id: String,
    /// Present on the first fragment
    pub name: Option<String>,
    pub arguments: String,
}

/// One fragment of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    /// The stream has nothing more to say
    pub done: bool,
}

impl CompletionChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(id: impl Into<String>, name: Option<&str>, arguments: impl Into<String>) -> Self {
        Self {
            tool_calls: vec![ToolCallDelta {
                id: id.into(),
                name: name.map(str::to_string),
                arguments: arguments.into(),
            }],
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty) && self.tool_calls.is_empty() && !self.done
    }
}

/// Token accounting reported by non-streaming calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A complete (non-streamed) response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

/// Model descriptor returned by `list_models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_tool_calling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            context_window: None,
            supports_tool_calling: None,
            description: None,
        }
    }
}

/// Result of `test_connection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lazy, finite, non-restartable sequence of completion fragments
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, ProviderError>> + Send>>;

/// A chat-completion backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend identifier, e.g. `ollama`
    fn id(&self) -> &str;

    /// Human-readable backend name
    fn name(&self) -> &str;

    /// The backend is reachable and offers at least one model
    async fn test_connection(&self) -> ConnectionStatus {
        match self.list_models().await {
            Ok(models) => ConnectionStatus {
                ok: !models.is_empty(),
                error: None,
            },
            Err(e) => ConnectionStatus {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Start a streamed completion. Transport failures before the first byte
    /// are returned here; later ones surface as stream items.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError>;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Rough token estimate (four characters per token)
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    /// Release held resources
    fn dispose(&self) {}
}
