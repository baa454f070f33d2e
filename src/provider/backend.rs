//! Backend adapters
//!
//! Every supported server speaks a dialect of the OpenAI chat API. The
//! differences (paths, framing, request knobs, model listing) live here.

use super::decoder::{decode_arguments, encode_arguments, generate_call_id, OllamaToolCall, WireFormat};
use super::{CompletionRequest, CompletionResponse, ModelInfo, ProviderError, Usage};
use crate::message::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Supported chat-completion backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Ollama,
    LmStudio,
    OpenAi,
    Gemini,
    /// Any other OpenAI-compatible server
    Generic,
}

/// Model name fragments that usually mean tool calling works on Ollama
const OLLAMA_TOOL_MODELS: &[&str] = &[
    "llama3", "qwen", "mistral", "gemma", "command-r", "deepseek", "phi-3", "phi-4",
];

impl Backend {
    pub const ALL: [Backend; 5] = [
        Backend::Ollama,
        Backend::LmStudio,
        Backend::OpenAi,
        Backend::Gemini,
        Backend::Generic,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Backend::Ollama => "ollama",
            Backend::LmStudio => "lmstudio",
            Backend::OpenAi => "openai",
            Backend::Gemini => "gemini",
            Backend::Generic => "generic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Ollama => "Ollama",
            Backend::LmStudio => "LM Studio",
            Backend::OpenAi => "OpenAI",
            Backend::Gemini => "Google Gemini",
            Backend::Generic => "OpenAI-compatible",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Backend::Ollama => "http://localhost:11434",
            Backend::LmStudio => "http://localhost:1234",
            Backend::OpenAi | Backend::Generic => "https://api.openai.com",
            Backend::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            Backend::Ollama => WireFormat::Ndjson,
            _ => WireFormat::Sse,
        }
    }

    /// Local servers run without credentials
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Backend::OpenAi | Backend::Gemini)
    }

    /// Conventional environment variable for the API key
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Backend::OpenAi => Some("OPENAI_API_KEY"),
            Backend::Gemini => Some("GEMINI_API_KEY"),
            _ => None,
        }
    }

    pub fn completion_url(&self, base_url: &str) -> String {
        match self {
            Backend::Ollama => format!("{}/api/chat", base_url),
            // Gemini's base URL already points at its OpenAI-compatible root
            Backend::Gemini => format!("{}/chat/completions", base_url),
            _ => format!("{}/v1/chat/completions", base_url),
        }
    }

    pub fn models_url(&self, base_url: &str) -> String {
        match self {
            Backend::Ollama => format!("{}/api/tags", base_url),
            Backend::Gemini => format!("{}/models", base_url),
            _ => format!("{}/v1/models", base_url),
        }
    }

    /// Build the JSON request body for this backend
    pub fn request_body(&self, request: &CompletionRequest, model: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": request.messages,
            "stream": stream,
        });

        match self {
            Backend::Ollama => {
                object_arguments(&mut body["messages"]);
                if let Some(temperature) = request.temperature {
                    body["options"] = json!({ "temperature": temperature });
                }
                if !request.tools.is_empty() {
                    body["tools"] = json!(request.tools);
                }
            }
            _ => {
                if let Some(temperature) = request.temperature {
                    body["temperature"] = json!(temperature);
                }
                if let Some(max_tokens) = request.max_tokens {
                    body["max_tokens"] = json!(max_tokens);
                }
                if !request.tools.is_empty() {
                    body["tools"] = json!(request.tools);
                    body["tool_choice"] = json!("auto");
                }
            }
        }

        body
    }

    /// Parse a model listing response
    pub fn parse_models(&self, body: &Value) -> Vec<ModelInfo> {
        match self {
            Backend::Ollama => body
                .get("models")
                .and_then(|m| m.as_array())
                .map(|models| {
                    models
                        .iter()
                        .filter_map(|m| {
                            let name = m.get("name")?.as_str()?;
                            let mut info = ModelInfo::new(name);
                            info.description = m
                                .pointer("/details/parameter_size")
                                .and_then(|s| s.as_str())
                                .map(str::to_string);
                            info.supports_tool_calling = Some(self.supports_tool_calling(name));
                            Some(info)
                        })
                        .collect()
                })
                .unwrap_or_default(),
            _ => body
                .get("data")
                .and_then(|d| d.as_array())
                .map(|models| {
                    models
                        .iter()
                        .filter_map(|m| {
                            let id = m.get("id")?.as_str()?;
                            if *self == Backend::OpenAi && !id.starts_with("gpt-") {
                                return None;
                            }
                            let mut info = ModelInfo::new(id);
                            info.description = m
                                .get("owned_by")
                                .and_then(|o| o.as_str())
                                .map(str::to_string);
                            if *self != Backend::LmStudio {
                                info.supports_tool_calling = Some(self.supports_tool_calling(id));
                            }
                            Some(info)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Static model list used when the backend cannot list its own
    pub fn known_models(&self) -> Vec<ModelInfo> {
        match self {
            Backend::Gemini => [
                ("gemini-2.0-flash", "Gemini 2.0 Flash", 1_048_576),
                ("gemini-2.0-flash-lite", "Gemini 2.0 Flash Lite", 1_048_576),
                ("gemini-1.5-pro", "Gemini 1.5 Pro", 2_097_152),
                ("gemini-1.5-flash", "Gemini 1.5 Flash", 1_048_576),
            ]
            .into_iter()
            .map(|(id, name, context_window)| ModelInfo {
                id: id.to_string(),
                name: name.to_string(),
                context_window: Some(context_window),
                supports_tool_calling: Some(true),
                description: None,
            })
            .collect(),
            _ => Vec::new(),
        }
    }

    pub fn supports_tool_calling(&self, model: &str) -> bool {
        match self {
            Backend::Ollama => {
                let model = model.to_lowercase();
                OLLAMA_TOOL_MODELS.iter().any(|p| model.contains(p))
            }
            _ => true,
        }
    }

    /// Parse a non-streamed completion body
    pub fn parse_completion(&self, body: &Value) -> Result<CompletionResponse, ProviderError> {
        match self {
            Backend::Ollama => {
                let message = body
                    .get("message")
                    .ok_or_else(|| ProviderError::Decode("response has no message".to_string()))?;
                let tool_calls = match message.get("tool_calls") {
                    Some(calls) => serde_json::from_value::<Vec<OllamaToolCall>>(calls.clone())
                        .map_err(|e| ProviderError::Decode(e.to_string()))?
                        .into_iter()
                        .map(|call| {
                            ToolCall::new(
                                call.id.unwrap_or_else(generate_call_id),
                                call.function.name,
                                encode_arguments(&call.function.arguments),
                            )
                        })
                        .collect(),
                    None => Vec::new(),
                };
                let prompt = body.get("prompt_eval_count").and_then(|v| v.as_u64());
                let completion = body.get("eval_count").and_then(|v| v.as_u64());
                let usage = match (prompt, completion) {
                    (Some(p), Some(c)) => Some(Usage {
                        prompt_tokens: p,
                        completion_tokens: c,
                        total_tokens: p + c,
                    }),
                    _ => None,
                };
                Ok(CompletionResponse {
                    content: message
                        .get("content")
                        .and_then(|c| c.as_str())
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                    tool_calls,
                    usage,
                })
            }
            _ => {
                let message = body
                    .pointer("/choices/0/message")
                    .ok_or_else(|| ProviderError::Decode("response has no choices".to_string()))?;
                let tool_calls = match message.get("tool_calls") {
                    Some(Value::Null) | None => Vec::new(),
                    Some(calls) => serde_json::from_value::<Vec<ToolCall>>(calls.clone())
                        .map_err(|e| ProviderError::Decode(e.to_string()))?,
                };
                let usage = body
                    .get("usage")
                    .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());
                Ok(CompletionResponse {
                    content: message
                        .get("content")
                        .and_then(|c| c.as_str())
                        .map(str::to_string),
                    tool_calls,
                    usage,
                })
            }
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Ollama takes tool-call arguments in history as objects, not strings
fn object_arguments(messages: &mut Value) {
    let Some(messages) = messages.as_array_mut() else {
        return;
    };
    for message in messages {
        let Some(calls) = message.get_mut("tool_calls").and_then(Value::as_array_mut) else {
            continue;
        };
        for call in calls {
            if let Some(arguments) = call.pointer_mut("/function/arguments") {
                if let Some(raw) = arguments.as_str() {
                    *arguments = decode_arguments(raw);
                }
            }
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Backend::Ollama),
            "lmstudio" | "lm-studio" => Ok(Backend::LmStudio),
            "openai" => Ok(Backend::OpenAi),
            "gemini" => Ok(Backend::Gemini),
            "generic" => Ok(Backend::Generic),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatMessage;
    use crate::tool::{ToolDefinition, ToolSchema};

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_tools(vec![ToolSchema::from(ToolDefinition {
                name: "read_file".to_string(),
                description: "Read a file".to_string(),
                parameters: json!({"type": "object"}),
            })])
            .with_temperature(0.0)
            .with_max_tokens(Some(256))
    }

    #[test]
    fn test_ollama_request_shape() {
        let body = Backend::Ollama.request_body(&request(), "qwen2.5", true);
        assert_eq!(body["model"], "qwen2.5");
        assert_eq!(body["options"]["temperature"], 0.0);
        assert!(body.get("temperature").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
        assert_eq!(
            Backend::Ollama.completion_url("http://localhost:11434"),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn test_ollama_history_arguments_are_objects() {
        let calls = vec![
            ToolCall::new("c1", "list_files", r#"{"path":"."}"#),
            ToolCall::new("c2", "list_files", "not json"),
        ];
        let history = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("list"),
            ChatMessage::assistant("", calls),
            ChatMessage::tool("c1", "bp/"),
        ];
        let request = CompletionRequest::new(history);

        let body = Backend::Ollama.request_body(&request, "qwen2.5", true);
        let sent = &body["messages"][2]["tool_calls"];
        assert_eq!(sent[0]["function"]["arguments"], json!({"path": "."}));
        assert_eq!(sent[1]["function"]["arguments"], json!({}));

        let body = Backend::OpenAi.request_body(&request, "gpt-4o", true);
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"path":"."}"#
        );
    }

    #[test]
    fn test_openai_request_shape() {
        let body = Backend::OpenAi.request_body(&request(), "gpt-4o", false);
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_openai_models_filtered_to_gpt() {
        let body = json!({"data": [{"id": "gpt-4o", "owned_by": "openai"}, {"id": "whisper-1"}]});
        let models = Backend::OpenAi.parse_models(&body);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "gpt-4o");
        assert_eq!(models[0].description.as_deref(), Some("openai"));
    }

    #[test]
    fn test_ollama_tool_support_heuristic() {
        assert!(Backend::Ollama.supports_tool_calling("Qwen2.5-Coder:7b"));
        assert!(!Backend::Ollama.supports_tool_calling("tinyllama"));
        assert!(Backend::Gemini.supports_tool_calling("anything"));
    }

    #[test]
    fn test_parse_completion_openai() {
        let body = json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "ask_user", "arguments": "{}"}}
            ]}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let response = Backend::Generic.parse_completion(&body).unwrap();
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls[0].name(), "ask_user");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_completion_ollama() {
        let body = json!({
            "message": {"content": "", "tool_calls": [{"function": {"name": "list_files", "arguments": {"path": "."}}}]},
            "prompt_eval_count": 3,
            "eval_count": 4
        });
        let response = Backend::Ollama.parse_completion(&body).unwrap();
        assert_eq!(response.tool_calls[0].arguments(), r#"{"path":"."}"#);
        assert!(response.tool_calls[0].id.starts_with("call_"));
        assert_eq!(response.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn test_backend_parse_and_display() {
        for backend in Backend::ALL {
            assert_eq!(backend.id().parse::<Backend>().unwrap(), backend);
        }
        assert!("nope".parse::<Backend>().is_err());
        assert_eq!(Backend::Gemini.known_models().len(), 4);
    }
}
