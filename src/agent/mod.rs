//! Agent system
//!
//! - `AgentLoop`: think/act state machine, streams completions and
//!   dispatches tool calls through the executor
//! - `AgentConfig`: iteration budget, sampling, interaction mode
//! - `PromptBuilder`: system prompt with auto-injected knowledge
//! - `CancelHandle` / `StateTracker`: cancellation and observable state

mod base;
mod config;
pub mod prompt;
mod state;
mod stream;

pub use base::{AgentLoop, TASK_COMPLETE_TOOL};
pub use config::{AgentConfig, InteractionMode};
pub use prompt::{PromptBuilder, PromptOptions};
pub use state::{CancelHandle, StateTracker};
pub use stream::StreamAccumulator;
