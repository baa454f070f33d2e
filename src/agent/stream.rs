//! Completion stream accumulation

use crate::message::ToolCall;
use crate::provider::ToolCallDelta;
use indexmap::IndexMap;

/// Running text buffer plus tool calls keyed by call id, in first-seen order
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: IndexMap<String, (String, String)>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Fold one tool-call fragment in. The first fragment for an id fixes the
    /// name; later fragments only extend the argument string. Returns the
    /// tool name when this fragment opened a new call.
    pub fn push_tool_delta(&mut self, delta: &ToolCallDelta) -> Option<String> {
        match self.calls.get_mut(&delta.id) {
            Some((_, arguments)) => {
                arguments.push_str(&delta.arguments);
                None
            }
            None => {
                let name = delta.name.clone().unwrap_or_default();
                self.calls
                    .insert(delta.id.clone(), (name.clone(), delta.arguments.clone()));
                Some(name)
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<ToolCall>) {
        let calls = self
            .calls
            .into_iter()
            .map(|(id, (name, arguments))| ToolCall::new(id, name, arguments))
            .collect();
        (self.text, calls)
    }
}
