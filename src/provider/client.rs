//! OpenAI-compatible provider client
//!
//! One HTTP client for every backend. Streaming responses are read as raw
//! bytes and decoded with `StreamDecoder` so the backend's framing (SSE or
//! NDJSON) and tool-call id quirks never reach the agent loop.

use super::{
    Backend, CompletionRequest, CompletionResponse, CompletionStream, LlmProvider, ModelInfo,
    ProviderConfig, ProviderError, StreamDecoder,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Instant;

/// Provider for any backend speaking a dialect of the OpenAI chat API
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    backend: Backend,
    base_url: String,
    api_key: Option<String>,
    model: String,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create a provider from config
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder().build()?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() && config.backend.requires_api_key() {
            tracing::warn!(
                target: "llm",
                backend = %config.backend,
                "No API key configured; requests will likely be rejected"
            );
        }

        Ok(Self {
            backend: config.backend,
            base_url: config.effective_base_url(),
            api_key,
            model: config.model.clone(),
            http_client,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self.http_client.get(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a completion request and fail on non-success status
    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = self.backend.request_body(request, &self.model, stream);

        tracing::info!(
            target: "llm",
            backend = %self.backend,
            model = %self.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            stream,
            "Starting LLM call"
        );

        let response = self
            .post(self.backend.completion_url(&self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "llm", error = %e, "LLM request failed");
                ProviderError::Http(e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            tracing::error!(target: "llm", status, error = %message, "LLM call returned error");
            return Err(ProviderError::Api { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        self.backend.id()
    }

    fn name(&self) -> &str {
        self.backend.display_name()
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = match self.get(self.backend.models_url(&self.base_url)).send().await {
            Ok(response) => response,
            Err(e) if self.backend == Backend::Gemini => {
                tracing::debug!(target: "llm", error = %e, "Model listing failed; using known models");
                return Ok(self.backend.known_models());
            }
            Err(e) => return Err(ProviderError::Http(e)),
        };

        if !response.status().is_success() {
            if self.backend == Backend::Gemini {
                return Ok(self.backend.known_models());
            }
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) => Ok(self.backend.parse_models(&body)),
            Err(_) if self.backend == Backend::Gemini => Ok(self.backend.known_models()),
            Err(e) => Err(ProviderError::Decode(e.to_string())),
        }
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let response = self.send(&request, true).await?;
        let mut decoder = StreamDecoder::new(self.backend.wire_format());
        let start = Instant::now();

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();

            while let Some(item) = bytes.next().await {
                match item {
                    Ok(bytes) => {
                        for chunk in decoder.push(&bytes) {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        tracing::error!(target: "llm", error = %e, "Stream read error");
                        yield Err(ProviderError::Stream(e.to_string()));
                        return;
                    }
                }
            }

            for chunk in decoder.finish() {
                yield Ok(chunk);
            }

            tracing::info!(
                target: "llm",
                elapsed_ms = start.elapsed().as_millis() as u64,
                "LLM stream finished"
            );
        };

        Ok(Box::pin(stream))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let start = Instant::now();
        let response = self.send(&request, false).await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        let parsed = self.backend.parse_completion(&body)?;

        tracing::info!(
            target: "llm",
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            input_tokens = parsed.usage.map(|u| u.prompt_tokens),
            output_tokens = parsed.usage.map(|u| u.completion_tokens),
            tool_calls = parsed.tool_calls.len(),
            "LLM call completed"
        );

        Ok(parsed)
    }
}
