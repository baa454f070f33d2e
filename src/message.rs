//! Conversation history types.
//!
//! Messages are stored in the OpenAI chat-completions shape so a request body
//! can be produced by serializing the history directly.

use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function name and string-encoded arguments of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arguments(&self) -> &str {
        &self.function.arguments
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn. Empty text becomes `null` content, an empty call list
    /// is omitted entirely.
    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        Self {
            role: Role::Assistant,
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Append-only conversation history owned by one agent loop.
///
/// Holds at most one system message, always at position 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Insert the system prompt. Only takes effect on an empty history.
    pub fn push_system(&mut self, prompt: impl Into<String>) -> bool {
        if !self.messages.is_empty() {
            return false;
        }
        self.messages.push(ChatMessage::system(prompt));
        true
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.messages.push(ChatMessage::assistant(text, tool_calls));
    }

    pub fn push_tool_result(&mut self, tool_call_id: impl Into<String>, output: impl Into<String>) {
        self.messages.push(ChatMessage::tool(tool_call_id, output));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_inserted_once() {
        let mut conversation = Conversation::new();
        assert!(conversation.push_system("You are a helpful assistant."));
        conversation.push_user("Hello");
        assert!(!conversation.push_system("Another prompt"));

        let system_count = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(conversation.messages()[0].role, Role::System);
    }

    #[test]
    fn test_tool_use_conversation_wire_shape() {
        let mut conversation = Conversation::new();
        conversation.push_system("sys");
        conversation.push_user("What files are here?");
        conversation.push_assistant(
            "",
            vec![ToolCall::new("call_123", "list_files", r#"{"path":"."}"#)],
        );
        conversation.push_tool_result("call_123", "file1.txt\nfile2.txt");

        let json = serde_json::to_value(conversation.messages()).unwrap();
        assert_eq!(json[2]["role"], "assistant");
        assert!(json[2]["content"].is_null());
        assert_eq!(json[2]["tool_calls"][0]["type"], "function");
        assert_eq!(json[2]["tool_calls"][0]["function"]["name"], "list_files");
        assert_eq!(json[3]["role"], "tool");
        assert_eq!(json[3]["tool_call_id"], "call_123");
        assert!(json[1].get("tool_calls").is_none());
    }

    #[test]
    fn test_clear() {
        let mut conversation = Conversation::new();
        conversation.push_system("sys");
        conversation.push_user("hi");
        conversation.clear();
        assert!(conversation.is_empty());
        assert!(conversation.push_system("sys again"));
    }
}
