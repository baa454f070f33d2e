//! Loop state tracking and cancellation

use crate::events::{AgentEvent, EventSender, TaskState};
use crate::tool::ToolHost;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cloneable handle for cancelling the current run from another task.
///
/// Each run starts with a fresh token, so a cancel issued while the loop is
/// idle does not leak into the next run.
#[derive(Clone, Default)]
pub struct CancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token.lock().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.lock().is_cancelled()
    }

    /// Token of the current run
    pub fn token(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    /// Install a fresh token for a new run and return it
    pub(crate) fn rearm(&self) -> CancellationToken {
        let mut guard = self.token.lock();
        *guard = CancellationToken::new();
        guard.clone()
    }
}

/// Current loop state, shared with the host wrapper so tool round-trips can
/// report `waiting_*` states. Every `set` emits a `StateChange` event.
#[derive(Clone)]
pub struct StateTracker {
    state: Arc<Mutex<TaskState>>,
    events: EventSender,
}

impl StateTracker {
    pub fn new(events: EventSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(TaskState::Idle)),
            events,
        }
    }

    pub fn get(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn set(&self, state: TaskState) {
        *self.state.lock() = state;
        tracing::debug!(state = %state, "State change");
        let _ = self.events.send(AgentEvent::StateChange { state });
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }
}

/// Wraps the host's callbacks so blocking round-trips show up as
/// `waiting_approval` / `waiting_input` while they are pending.
pub(crate) struct ObservedHost {
    inner: Arc<dyn ToolHost>,
    tracker: StateTracker,
}

impl ObservedHost {
    pub(crate) fn new(inner: Arc<dyn ToolHost>, tracker: StateTracker) -> Self {
        Self { inner, tracker }
    }
}

#[async_trait]
impl ToolHost for ObservedHost {
    async fn ask_user(&self, question: &str) -> String {
        self.tracker.set(TaskState::WaitingInput);
        let answer = self.inner.ask_user(question).await;
        self.tracker.set(TaskState::ExecutingTools);
        answer
    }

    fn report_progress(&self, step: usize, total: usize, description: &str) {
        self.inner.report_progress(step, total, description);
    }

    async fn request_approval(
        &self,
        description: &str,
        details: &str,
        diff: Option<&str>,
    ) -> bool {
        self.tracker.set(TaskState::WaitingApproval);
        let approved = self.inner.request_approval(description, details, diff).await;
        self.tracker.set(TaskState::ExecutingTools);
        approved
    }
}
