//! Streaming response decoder
//!
//! Turns raw response bytes into `CompletionChunk`s. Handles both the
//! OpenAI-style SSE format (`data: {...}` lines, `[DONE]` sentinel) and
//! Ollama's newline-delimited JSON. Malformed lines are skipped.

use super::{CompletionChunk, ToolCallDelta};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Framing used by a backend's streaming endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `text/event-stream` with `data:` lines
    Sse,
    /// One JSON object per line
    Ndjson,
}

// OpenAI streaming payload
#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SseDelta {
    content: Option<String>,
    tool_calls: Option<Vec<SseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<SseFunction>,
}

#[derive(Debug, Deserialize)]
struct SseFunction {
    name: Option<String>,
    arguments: Option<String>,
}

// Ollama streaming payload
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    done: bool,
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OllamaToolCall {
    pub(crate) id: Option<String>,
    pub(crate) function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OllamaFunction {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) arguments: Value,
}

/// Generate an id for a call the backend did not name
pub(crate) fn generate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Arguments as a JSON string, whatever shape the backend used
pub(crate) fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Arguments as a JSON object for backends that take objects; anything
/// unparseable becomes `{}`
pub(crate) fn decode_arguments(arguments: &str) -> Value {
    serde_json::from_str::<Value>(arguments)
        .ok()
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Default::default()))
}

/// Incremental decoder for one response body
#[derive(Debug)]
pub struct StreamDecoder {
    format: WireFormat,
    buffer: Vec<u8>,
    /// OpenAI sends the id only on a call's first fragment
    call_ids: HashMap<usize, String>,
    done: bool,
}

impl StreamDecoder {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: Vec::new(),
            call_ids: HashMap::new(),
            done: false,
        }
    }

    /// Whether a `done` chunk has been produced
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes, returning every chunk completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<CompletionChunk> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(chunk) = self.decode_line(line.trim()) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Flush the trailing partial line and close the stream. Always ends
    /// with exactly one `done` chunk across the decoder's lifetime.
    pub fn finish(&mut self) -> Vec<CompletionChunk> {
        let mut chunks = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            if let Some(chunk) = self.decode_line(rest.trim()) {
                chunks.push(chunk);
            }
        }
        if !self.done {
            self.done = true;
            chunks.push(CompletionChunk::done());
        }
        chunks
    }

    fn decode_line(&mut self, line: &str) -> Option<CompletionChunk> {
        if line.is_empty() || self.done {
            return None;
        }

        let chunk = match self.format {
            WireFormat::Sse => self.decode_sse(line)?,
            WireFormat::Ndjson => self.decode_ndjson(line)?,
        };

        if chunk.done {
            self.done = true;
        }
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }

    fn decode_sse(&mut self, line: &str) -> Option<CompletionChunk> {
        // Comments and other fields (event:, id:) carry nothing for us
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return Some(CompletionChunk::done());
        }

        let parsed: SseChunk = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(target: "llm", error = %e, "Skipping malformed stream chunk");
                return None;
            }
        };
        let choice = parsed.choices.into_iter().next()?;

        let mut chunk = CompletionChunk {
            content: choice.delta.content,
            tool_calls: Vec::new(),
            done: choice.finish_reason.is_some(),
        };

        for (position, call) in choice.delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let index = call.index.unwrap_or(position);
            let id = match call.id.filter(|id| !id.is_empty()) {
                Some(id) => {
                    self.call_ids.insert(index, id.clone());
                    id
                }
                None => self
                    .call_ids
                    .entry(index)
                    .or_insert_with(generate_call_id)
                    .clone(),
            };
            let (name, arguments) = match call.function {
                Some(f) => (f.name.filter(|n| !n.is_empty()), f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            chunk.tool_calls.push(ToolCallDelta { id, name, arguments });
        }

        Some(chunk)
    }

    fn decode_ndjson(&mut self, line: &str) -> Option<CompletionChunk> {
        let parsed: OllamaChunk = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(target: "llm", error = %e, "Skipping malformed stream line");
                return None;
            }
        };

        let mut chunk = CompletionChunk {
            content: None,
            tool_calls: Vec::new(),
            done: parsed.done,
        };

        if let Some(message) = parsed.message {
            chunk.content = message.content;
            // Ollama delivers each call whole, in a single line
            for call in message.tool_calls.unwrap_or_default() {
                chunk.tool_calls.push(ToolCallDelta {
                    id: call.id.filter(|id| !id.is_empty()).unwrap_or_else(generate_call_id),
                    name: Some(call.function.name),
                    arguments: encode_arguments(&call.function.arguments),
                });
            }
        }

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(format: WireFormat, parts: &[&str]) -> Vec<CompletionChunk> {
        let mut decoder = StreamDecoder::new(format);
        let mut chunks = Vec::new();
        for part in parts {
            chunks.extend(decoder.push(part.as_bytes()));
        }
        chunks.extend(decoder.finish());
        chunks
    }

    #[test]
    fn test_sse_text_split_across_reads() {
        let chunks = decode_all(
            WireFormat::Sse,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n",
                "data: {\"choices\":[{\"delta\":{\"con",
                "tent\":\"lo\"},\"finish_reason\":null}]}\n\n",
                "data: [DONE]\n\n",
            ],
        );

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content.as_deref(), Some("Hel"));
        assert_eq!(chunks[1].content.as_deref(), Some("lo"));
        assert!(chunks[2].done);
    }

    #[test]
    fn test_sse_tool_call_fragments_keyed_by_id() {
        let chunks = decode_all(
            WireFormat::Sse,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"read_file\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"path\\\":\"}}]},\"finish_reason\":null}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"a.json\\\"}\"}}]},\"finish_reason\":null}]}\n",
            ],
        );

        let deltas: Vec<_> = chunks.iter().flat_map(|c| c.tool_calls.iter()).collect();
        assert_eq!(deltas.len(), 3);
        assert!(deltas.iter().all(|d| d.id == "call_a"));
        assert_eq!(deltas[0].name.as_deref(), Some("read_file"));
        assert!(deltas[1].name.is_none());

        let args: String = deltas.iter().map(|d| d.arguments.as_str()).collect();
        assert_eq!(args, r#"{"path":"a.json"}"#);
    }

    #[test]
    fn test_sse_missing_id_gets_generated_id() {
        let chunks = decode_all(
            WireFormat::Sse,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"name\":\"ask_user\",\"arguments\":\"{\"}}]}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"arguments\":\"}\"}}]}}]}\n",
            ],
        );

        let first = &chunks[0].tool_calls[0];
        let second = &chunks[1].tool_calls[0];
        assert!(first.id.starts_with("call_"));
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_sse_done_emitted_once() {
        let chunks = decode_all(
            WireFormat::Sse,
            &[
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
                "data: [DONE]\n",
            ],
        );
        assert_eq!(chunks.iter().filter(|c| c.done).count(), 1);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let chunks = decode_all(
            WireFormat::Sse,
            &[
                ": keep-alive\n",
                "data: {not json}\n",
                "event: ping\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            ],
        );
        assert_eq!(chunks[0].content.as_deref(), Some("ok"));
        assert!(chunks[1].done);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_ndjson_object_arguments_reencoded() {
        let chunks = decode_all(
            WireFormat::Ndjson,
            &[
                "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"list_files\",\"arguments\":{\"path\":\".\"}}}]},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}",
            ],
        );

        assert_eq!(chunks.len(), 2);
        let call = &chunks[0].tool_calls[0];
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.name.as_deref(), Some("list_files"));
        assert_eq!(call.arguments, r#"{"path":"."}"#);
        assert!(chunks[1].done);
    }

    #[test]
    fn test_stream_without_terminator_still_finishes() {
        let chunks = decode_all(WireFormat::Ndjson, &["{\"message\":{\"content\":\"hi\"},\"done\":false}\n"]);
        assert_eq!(chunks[0].content.as_deref(), Some("hi"));
        assert!(chunks.last().unwrap().done);
    }
}
