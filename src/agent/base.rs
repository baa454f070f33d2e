//! AgentLoop - think/act state machine
//!
//! Runs the cycle:
//! 1. Stream a completion from the provider, forwarding text as it arrives
//! 2. Execute the requested tool calls, strictly in order
//! 3. Repeat until: text-only response, `task_complete`, cancellation,
//!    a failed cycle, or the iteration budget runs out
//!
//! Everything the loop does is reported through `AgentEvent`s.

use super::state::{CancelHandle, ObservedHost, StateTracker};
use super::stream::StreamAccumulator;
use super::AgentConfig;
use crate::events::{AgentEvent, EventSender, RunOutcome, TaskState};
use crate::executor::{ToolExecutionRequest, ToolExecutor};
use crate::message::{ChatMessage, Conversation};
use crate::provider::{CompletionRequest, LlmProvider, ProviderError};
use crate::tool::{ToolContext, ToolRegistry};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tool whose call ends the run; its output becomes the summary
pub const TASK_COMPLETE_TOOL: &str = "task_complete";

pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    executor: ToolExecutor,
    system_prompt: String,
    config: AgentConfig,
    history: Conversation,
    iterations: usize,
    tracker: StateTracker,
    cancel: CancelHandle,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        context: ToolContext,
        system_prompt: impl Into<String>,
        config: AgentConfig,
        events: EventSender,
    ) -> Self {
        let tracker = StateTracker::new(events);
        let cancel = context.cancellation.clone();
        let host = Arc::new(ObservedHost::new(context.host.clone(), tracker.clone()));
        let executor = ToolExecutor::new(registry, context.with_host(host));

        Self {
            provider,
            executor,
            system_prompt: system_prompt.into(),
            config,
            history: Conversation::new(),
            iterations: 0,
            tracker,
            cancel,
        }
    }

    /// Replace the system prompt. Takes effect the next time the history is
    /// empty (first run, or after `reset`).
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> TaskState {
        self.tracker.get()
    }

    /// Snapshot of the conversation so far
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.messages().to_vec()
    }

    /// Number of messages in the conversation
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Handle for cancelling from another task while `run` is in flight
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request cancellation; observed at the next chunk or cycle boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clear history and the iteration counter, back to `idle`
    pub fn reset(&mut self) {
        self.history.clear();
        self.iterations = 0;
        self.tracker.set(TaskState::Idle);
    }

    /// Run one task to a terminal state.
    ///
    /// `&mut self` keeps a second run from starting on the same loop while
    /// this one is in flight.
    pub async fn run(&mut self, user_message: &str) -> RunOutcome {
        let token = self.cancel.rearm();
        self.iterations = 0;

        if self.history.push_system(self.system_prompt.clone()) {
            tracing::debug!(chars = self.system_prompt.len(), "System prompt added");
        }
        self.history.push_user(user_message);

        let outcome = self.drive(&token).await;
        self.finish(&outcome);
        outcome
    }

    async fn drive(&mut self, token: &CancellationToken) -> RunOutcome {
        while self.iterations < self.config.max_iterations {
            if token.is_cancelled() {
                return RunOutcome::Cancelled;
            }

            self.iterations += 1;
            tracing::info!(
                iteration = self.iterations,
                max_iterations = self.config.max_iterations,
                messages = self.history.len(),
                "Starting cycle"
            );
            self.tracker.set(TaskState::Thinking);

            let accumulated = match self.stream_cycle(token).await {
                Ok(Some(accumulated)) => accumulated,
                Ok(None) => return RunOutcome::Cancelled,
                Err(e) => {
                    tracing::error!(error = %e, "Cycle failed");
                    return RunOutcome::Failed {
                        message: e.to_string(),
                    };
                }
            };

            let (text, calls) = accumulated.into_parts();
            if calls.is_empty() {
                self.history.push_assistant(text.clone(), Vec::new());
                return RunOutcome::Completed { summary: text };
            }

            self.tracker.set(TaskState::ExecutingTools);
            let requests: Vec<ToolExecutionRequest> =
                calls.iter().map(ToolExecutionRequest::from).collect();
            self.history.push_assistant(text, calls);

            let results = self.executor.execute_all(requests).await;

            let mut summary = None;
            for result in results {
                let output = result.result.output().to_string();
                self.history.push_tool_result(&result.call_id, output.clone());

                if result.tool_name == TASK_COMPLETE_TOOL && summary.is_none() {
                    summary = Some(output.clone());
                }

                let _ = self.tracker.events().send(AgentEvent::ToolCallCompleted {
                    call_id: result.call_id,
                    tool: result.tool_name,
                    output,
                    success: result.result.is_success(),
                });
            }

            if let Some(summary) = summary {
                return RunOutcome::Completed { summary };
            }
        }

        if token.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::IterationLimit {
                limit: self.config.max_iterations,
            }
        }
    }

    /// Stream one completion into an accumulator. `None` means cancellation
    /// was observed before the stream finished.
    async fn stream_cycle(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<StreamAccumulator>, ProviderError> {
        let request = CompletionRequest::new(self.history.messages().to_vec())
            .with_tools(self.executor.registry().schemas())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(None),
            stream = self.provider.stream_completion(request) => stream?,
        };

        let events = self.tracker.events();
        let mut accumulated = StreamAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
                accumulated.push_text(content);
                let _ = events.send(AgentEvent::StreamChunk {
                    content: content.to_string(),
                });
            }

            for delta in &chunk.tool_calls {
                if let Some(tool) = accumulated.push_tool_delta(delta) {
                    tracing::debug!(call_id = %delta.id, tool = %tool, "Tool call started");
                    let _ = events.send(AgentEvent::ToolCallStarted {
                        call_id: delta.id.clone(),
                        tool,
                    });
                }
            }

            if chunk.done {
                break;
            }
        }

        let _ = events.send(AgentEvent::StreamEnd);
        Ok(Some(accumulated))
    }

    fn finish(&self, outcome: &RunOutcome) {
        let events = self.tracker.events();
        match outcome {
            RunOutcome::Completed { summary } => {
                self.tracker.set(TaskState::Completed);
                let _ = events.send(AgentEvent::Complete {
                    summary: summary.clone(),
                });
            }
            RunOutcome::Cancelled => {
                tracing::info!(iterations = self.iterations, "Run cancelled");
                self.tracker.set(TaskState::Cancelled);
            }
            RunOutcome::Failed { message } => {
                self.tracker.set(TaskState::Error);
                let _ = events.send(AgentEvent::Error {
                    message: message.clone(),
                });
            }
            RunOutcome::IterationLimit { limit } => {
                tracing::warn!(limit, "Iteration budget exhausted");
                let _ = events.send(AgentEvent::Error {
                    message: format!("Maximum iterations ({}) reached.", limit),
                });
                self.tracker.set(TaskState::Error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AutoApprove;
    use crate::events::{event_channel, EventReceiver};
    use crate::message::Role;
    use crate::provider::{
        CompletionChunk, CompletionResponse, CompletionStream, ModelInfo,
    };
    use crate::tool::{Tool, ToolDefinition, ToolError, ToolOutput};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned chunk sequences, one per completion request. The last
    /// script repeats once the queue runs dry.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Vec<CompletionChunk>>>,
        last: Mutex<Vec<CompletionChunk>>,
        calls: AtomicUsize,
        cancel_on_call: Option<CancelHandle>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<CompletionChunk>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                last: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                cancel_on_call: None,
            })
        }

        fn cancelling(scripts: Vec<Vec<CompletionChunk>>, handle: CancelHandle) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                last: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                cancel_on_call: Some(handle),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(vec![ModelInfo::new("scripted")])
        }

        async fn stream_completion(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = &self.cancel_on_call {
                handle.cancel();
            }

            let chunks = match self.scripts.lock().pop_front() {
                Some(script) => {
                    *self.last.lock() = script.clone();
                    script
                }
                None => self.last.lock().clone(),
            };
            Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse::default())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn id(&self) -> &str {
            "failing"
        }

        fn name(&self) -> &str {
            "Failing"
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(Vec::new())
        }

        async fn stream_completion(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionStream, ProviderError> {
            Err(ProviderError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse::default())
        }
    }

    struct TaskComplete;

    #[async_trait]
    impl Tool for TaskComplete {
        fn name(&self) -> &str {
            TASK_COMPLETE_TOOL
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: TASK_COMPLETE_TOOL.to_string(),
                description: "Finish".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "summary": { "type": "string" } },
                    "required": ["summary"]
                }),
            }
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::new(args["summary"].as_str().unwrap_or_default()))
        }
    }

    struct Noop;

    #[async_trait]
    impl Tool for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "noop".to_string(),
                description: "Does nothing".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::new("ok"))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(TaskComplete).unwrap();
        registry.register(Noop).unwrap();
        Arc::new(registry)
    }

    fn agent_with(
        provider: Arc<dyn LlmProvider>,
        context: ToolContext,
        config: AgentConfig,
    ) -> (AgentLoop, EventReceiver) {
        let (tx, rx) = event_channel();
        let agent = AgentLoop::new(provider, registry(), context, "You are a test agent.", config, tx);
        (agent, rx)
    }

    fn context() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), Arc::new(AutoApprove))
    }

    fn drain(rx: &mut EventReceiver) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn states(events: &[AgentEvent]) -> Vec<TaskState> {
        events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::StateChange { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn completions(events: &[AgentEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Complete { summary } => Some(summary.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_text_only_response_completes() {
        let provider = ScriptedProvider::new(vec![vec![
            CompletionChunk::text("h"),
            CompletionChunk::text("i"),
            CompletionChunk::done(),
        ]]);
        let (mut agent, mut rx) = agent_with(provider.clone(), context(), AgentConfig::default());
        assert_eq!(agent.state(), TaskState::Idle);

        let outcome = agent.run("hello").await;
        assert_eq!(outcome, RunOutcome::Completed { summary: "hi".into() });

        let events = drain(&mut rx);
        assert_eq!(states(&events), vec![TaskState::Thinking, TaskState::Completed]);
        assert_eq!(completions(&events), vec!["hi".to_string()]);
        assert_eq!(
            events.iter().filter(|e| matches!(e, AgentEvent::StreamEnd)).count(),
            1
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(agent.state(), TaskState::Completed);

        let history = agent.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[1].content.as_deref(), Some("hello"));
        assert_eq!(history[2].content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_task_complete_ends_run() {
        let provider = ScriptedProvider::new(vec![vec![
            CompletionChunk::tool_call("call_1", Some(TASK_COMPLETE_TOOL), r#"{"summary":"done"}"#),
            CompletionChunk::done(),
        ]]);
        let (mut agent, mut rx) = agent_with(provider.clone(), context(), AgentConfig::default());

        let outcome = agent.run("build it").await;
        assert_eq!(outcome.summary(), Some("done"));
        assert_eq!(provider.calls(), 1);
        assert_eq!(agent.iterations(), 1);

        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![TaskState::Thinking, TaskState::ExecutingTools, TaskState::Completed]
        );
        assert_eq!(completions(&events), vec!["done".to_string()]);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolCallCompleted { call_id, success: true, .. } if call_id == "call_1"
        )));
    }

    #[tokio::test]
    async fn test_task_complete_runs_whole_batch() {
        let provider = ScriptedProvider::new(vec![vec![
            CompletionChunk::tool_call("a", Some(TASK_COMPLETE_TOOL), r#"{"summary":"all set"}"#),
            CompletionChunk::tool_call("b", Some("noop"), "{}"),
            CompletionChunk::done(),
        ]]);
        let (mut agent, mut rx) = agent_with(provider, context(), AgentConfig::default());

        let outcome = agent.run("go").await;
        assert_eq!(outcome.summary(), Some("all set"));

        let completed: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::ToolCallCompleted { call_id, .. } => Some(call_id),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["a".to_string(), "b".to_string()]);

        let history = agent.history();
        assert_eq!(history[history.len() - 2].tool_call_id.as_deref(), Some("a"));
        assert_eq!(history[history.len() - 1].tool_call_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_iteration_budget() {
        let provider = ScriptedProvider::new(vec![vec![
            CompletionChunk::tool_call("n", Some("noop"), "{}"),
            CompletionChunk::done(),
        ]]);
        let config = AgentConfig::default().with_max_iterations(1);
        let (mut agent, mut rx) = agent_with(provider.clone(), context(), config);

        let outcome = agent.run("loop forever").await;
        assert_eq!(outcome, RunOutcome::IterationLimit { limit: 1 });
        assert_eq!(provider.calls(), 1);
        assert_eq!(agent.state(), TaskState::Error);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::Error { message } if message == "Maximum iterations (1) reached."
        )));
        assert_eq!(states(&events).last(), Some(&TaskState::Error));
    }

    #[tokio::test]
    async fn test_fragments_are_concatenated() {
        let provider = ScriptedProvider::new(vec![
            vec![
                CompletionChunk::tool_call("c1", Some(TASK_COMPLETE_TOOL), r#"{"sum"#),
                CompletionChunk::tool_call("c1", None, r#"mary":"#),
                CompletionChunk::tool_call("c1", None, r#""joined"}"#),
                CompletionChunk::done(),
            ],
        ]);
        let (mut agent, mut rx) = agent_with(provider, context(), AgentConfig::default());

        let outcome = agent.run("x").await;
        assert_eq!(outcome.summary(), Some("joined"));

        let history = agent.history();
        let calls = history[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name(), TASK_COMPLETE_TOOL);
        assert_eq!(calls[0].arguments(), r#"{"summary":"joined"}"#);

        let started = drain(&mut rx)
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCallStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_is_fed_back() {
        let provider = ScriptedProvider::new(vec![
            vec![
                CompletionChunk::tool_call("bad", Some("noop"), "{not json"),
                CompletionChunk::done(),
            ],
            vec![CompletionChunk::text("recovered"), CompletionChunk::done()],
        ]);
        let (mut agent, mut rx) = agent_with(provider.clone(), context(), AgentConfig::default());

        let outcome = agent.run("try").await;
        assert_eq!(outcome.summary(), Some("recovered"));
        assert_eq!(provider.calls(), 2);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolCallCompleted { success: false, output, .. }
                if output.starts_with("Invalid arguments for noop")
        )));
        assert!(!states(&events).contains(&TaskState::Error));
    }

    #[tokio::test]
    async fn test_provider_error_ends_in_error_state() {
        let (mut agent, mut rx) = agent_with(Arc::new(FailingProvider), context(), AgentConfig::default());

        let outcome = agent.run("hi").await;
        assert!(matches!(outcome, RunOutcome::Failed { ref message } if message.contains("500")));
        assert_eq!(agent.state(), TaskState::Error);

        let events = drain(&mut rx);
        assert_eq!(states(&events), vec![TaskState::Thinking, TaskState::Error]);
        assert!(events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_stream_error_item_fails_cycle() {
        struct BrokenStream;

        #[async_trait]
        impl LlmProvider for BrokenStream {
            fn id(&self) -> &str {
                "broken"
            }

            fn name(&self) -> &str {
                "Broken"
            }

            async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
                Ok(Vec::new())
            }

            async fn stream_completion(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionStream, ProviderError> {
                let items = vec![
                    Ok(CompletionChunk::text("partial")),
                    Err(ProviderError::Stream("connection reset".to_string())),
                ];
                Ok(Box::pin(futures::stream::iter(items)))
            }

            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, ProviderError> {
                Ok(CompletionResponse::default())
            }
        }

        let (mut agent, _rx) = agent_with(Arc::new(BrokenStream), context(), AgentConfig::default());
        let outcome = agent.run("hi").await;
        assert!(matches!(outcome, RunOutcome::Failed { ref message } if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_cancel_mid_run() {
        let ctx = context();
        let handle = ctx.cancellation.clone();
        let provider = ScriptedProvider::cancelling(
            vec![vec![CompletionChunk::text("never seen"), CompletionChunk::done()]],
            handle,
        );
        let (mut agent, mut rx) = agent_with(provider.clone(), ctx, AgentConfig::default());

        let outcome = agent.run("hi").await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(agent.state(), TaskState::Cancelled);
        assert_eq!(provider.calls(), 1);

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::StreamChunk { .. })));
        assert!(completions(&events).is_empty());
    }

    /// Cancels the run it belongs to, then finishes normally
    struct CancelsRun;

    #[async_trait]
    impl Tool for CancelsRun {
        fn name(&self) -> &str {
            "cancels_run"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "cancels_run".to_string(),
                description: "Cancels the run".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            ctx.cancellation.cancel();
            Ok(ToolOutput::new("cancelled the run"))
        }
    }

    #[tokio::test]
    async fn test_cancel_during_tools_finishes_batch() {
        let provider = ScriptedProvider::new(vec![vec![
            CompletionChunk::tool_call("c1", Some("cancels_run"), "{}"),
            CompletionChunk::tool_call("c2", Some("noop"), "{}"),
            CompletionChunk::done(),
        ]]);
        let mut registry = ToolRegistry::new();
        registry.register(CancelsRun).unwrap();
        registry.register(Noop).unwrap();

        let (tx, mut rx) = event_channel();
        let mut agent = AgentLoop::new(
            provider.clone(),
            Arc::new(registry),
            context(),
            "You are a test agent.",
            AgentConfig::default(),
            tx,
        );

        let outcome = agent.run("go").await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(agent.state(), TaskState::Cancelled);
        assert_eq!(provider.calls(), 1);

        let completed: Vec<(String, bool)> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::ToolCallCompleted { call_id, success, .. } => Some((call_id, success)),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![("c1".to_string(), true), ("c2".to_string(), true)]);

        let history = agent.history();
        assert_eq!(history.last().and_then(|m| m.tool_call_id.as_deref()), Some("c2"));
    }

    #[tokio::test]
    async fn test_cancel_before_run_is_cleared() {
        let provider = ScriptedProvider::new(vec![vec![CompletionChunk::text("fine"), CompletionChunk::done()]]);
        let (mut agent, _rx) = agent_with(provider, context(), AgentConfig::default());

        agent.cancel();
        agent.cancel();
        let outcome = agent.run("hi").await;
        assert_eq!(outcome.summary(), Some("fine"));
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let provider = ScriptedProvider::new(vec![vec![CompletionChunk::text("hi"), CompletionChunk::done()]]);
        let (mut agent, _rx) = agent_with(provider, context(), AgentConfig::default());
        agent.run("hello").await;
        assert!(!agent.history().is_empty());

        agent.reset();
        assert!(agent.history().is_empty());
        assert_eq!(agent.state(), TaskState::Idle);
        assert_eq!(agent.iterations(), 0);

        agent.reset();
        assert!(agent.history().is_empty());
        assert_eq!(agent.state(), TaskState::Idle);
    }

    #[tokio::test]
    async fn test_system_prompt_added_once_across_runs() {
        let provider = ScriptedProvider::new(vec![vec![CompletionChunk::text("ok"), CompletionChunk::done()]]);
        let (mut agent, _rx) = agent_with(provider, context(), AgentConfig::default());

        agent.run("first").await;
        agent.set_system_prompt("ignored until reset");
        agent.run("second").await;

        let history = agent.history();
        assert_eq!(history.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(history[0].content.as_deref(), Some("You are a test agent."));
        assert_eq!(history.len(), 5);
    }
}
