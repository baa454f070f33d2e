//! Agent event types
//!
//! These events are emitted by the agent loop during execution and consumed by
//! the host (CLI, editor panel, tests). This is the only way the loop reports
//! progress to the outside world.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Lifecycle state of the agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Thinking,
    Parsing,
    ExecutingTools,
    WaitingApproval,
    WaitingInput,
    Completed,
    Cancelled,
    Error,
}

impl TaskState {
    /// `completed`, `cancelled` and `error` end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Thinking => "thinking",
            TaskState::Parsing => "parsing",
            TaskState::ExecutingTools => "executing_tools",
            TaskState::WaitingApproval => "waiting_approval",
            TaskState::WaitingInput => "waiting_input",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Error => "error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted during a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Loop state changed
    StateChange { state: TaskState },

    // === Text Output ===
    /// Streaming text delta from the LLM
    StreamChunk { content: String },
    /// The completion stream for the current cycle finished
    StreamEnd,

    // === Tool Execution ===
    /// First fragment of a tool call arrived
    ToolCallStarted { call_id: String, tool: String },
    /// Tool call finished (successfully or not)
    ToolCallCompleted {
        call_id: String,
        tool: String,
        output: String,
        success: bool,
    },

    // === Run Lifecycle ===
    Error { message: String },
    Complete { summary: String },
}

/// Sending half used by the loop
pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// Receiving half held by the host
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

/// Create an event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// How a call to `AgentLoop::run` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Text-only response, or the terminal tool was called
    Completed { summary: String },
    /// Cancelled by the host
    Cancelled,
    /// A cycle failed (provider or stream error)
    Failed { message: String },
    /// Iteration budget exhausted
    IterationLimit { limit: usize },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// Summary text if the run completed
    pub fn summary(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed { summary } => Some(summary),
            _ => None,
        }
    }

    /// The state the loop ends in for this outcome
    pub fn final_state(&self) -> TaskState {
        match self {
            RunOutcome::Completed { .. } => TaskState::Completed,
            RunOutcome::Cancelled => TaskState::Cancelled,
            RunOutcome::Failed { .. } | RunOutcome::IterationLimit { .. } => TaskState::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Error.is_terminal());
        assert!(!TaskState::Idle.is_terminal());
        assert!(!TaskState::WaitingApproval.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::StateChange {
            state: TaskState::ExecutingTools,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_change");
        assert_eq!(json["state"], "executing_tools");
    }
}
