//! OpenAI-compatible model backend.
//!
//! Works with OpenAI, DeepSeek, OpenRouter, vLLM, Ollama and any other
//! endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - JSON-schema constrained output
//! - `reasoning_content` as the result's thought

use agenx_core::error::ProviderError;
use agenx_core::message::{ContentPart, FunctionCall, Message, MessageContent, Role};
use agenx_core::provider::*;
use agenx_core::CancellationToken;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible backend bound to one model.
pub struct OpenAiBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        })
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Create a DeepSeek backend (convenience constructor).
    pub fn deepseek(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("deepseek", "https://api.deepseek.com/v1", api_key, model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert our messages to OpenAI API format.
    ///
    /// A tool-results message expands into one `tool` message per result.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };
            let name = (m.role == Role::User).then(|| api_name(&m.source));

            match &m.content {
                MessageContent::Text(text) => out.push(ApiMessage {
                    role: role.into(),
                    content: Some(serde_json::Value::String(text.clone())),
                    name,
                    tool_calls: None,
                    tool_call_id: None,
                }),
                MessageContent::MultiModal(parts) => {
                    let parts = parts
                        .iter()
                        .map(|p| match p {
                            ContentPart::Text { text } => {
                                serde_json::json!({ "type": "text", "text": text })
                            }
                            ContentPart::Image { url } => {
                                serde_json::json!({ "type": "image_url", "image_url": { "url": url } })
                            }
                        })
                        .collect();
                    out.push(ApiMessage {
                        role: role.into(),
                        content: Some(serde_json::Value::Array(parts)),
                        name,
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
                MessageContent::ToolCalls(calls) => out.push(ApiMessage {
                    role: "assistant".into(),
                    content: None,
                    name: None,
                    tool_calls: Some(
                        calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    ),
                    tool_call_id: None,
                }),
                MessageContent::ToolResults(results) => {
                    out.extend(results.iter().map(|r| ApiMessage {
                        role: "tool".into(),
                        content: Some(serde_json::Value::String(r.content.clone())),
                        name: None,
                        tool_calls: None,
                        tool_call_id: Some(r.call_id.clone()),
                    }));
                }
            }
        }
        out
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, request: &ModelRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": self.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if let Some(schema) = &request.json_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "output", "schema": schema, "strict": true },
            });
        }

        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    fn parse_response(api_response: ApiResponse) -> Result<CreateResult, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls: Vec<FunctionCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| FunctionCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let content = if tool_calls.is_empty() {
            MessageContent::Text(choice.message.content.unwrap_or_default())
        } else {
            MessageContent::ToolCalls(tool_calls)
        };

        let finish_reason = match choice.finish_reason.as_deref() {
            Some(reason) => FinishReason::from_api(reason),
            None if matches!(content, MessageContent::ToolCalls(_)) => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };

        Ok(CreateResult {
            content,
            finish_reason,
            usage: api_response
                .usage
                .map(|u| RequestUsage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default(),
            thought: choice.message.reasoning_content.filter(|t| !t.is_empty()),
            cached: false,
        })
    }
}

/// OpenAI restricts `name` to `[a-zA-Z0-9_-]`.
fn api_name(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateResult, ProviderError> {
        let body = self.request_body(&request, false);
        debug!(backend = %self.name, model = %self.model, "Sending completion request");

        let call = async {
            let response = self.post(&body, false).await?;
            let api_response: ApiResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;
            Self::parse_response(api_response)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = call => result,
        }
    }

    async fn create_stream(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        let body = self.request_body(&request, true);
        debug!(backend = %self.name, model = %self.model, "Sending streaming request");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = self.post(&body, true) => response?,
        };

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(read_sse(response.bytes_stream(), tx, cancel.clone(), self.name.clone()));

        Ok(rx)
    }
}

/// Read an SSE byte stream into chunks and one final result.
///
/// Lines are split on raw bytes and decoded whole, so a character split
/// across network reads survives. A stream that closes before `[DONE]`
/// is only accepted when a finish reason already arrived.
async fn read_sse<S, B, E>(
    byte_stream: S,
    tx: mpsc::Sender<Result<StreamItem, ProviderError>>,
    cancel: CancellationToken,
    backend_name: String,
) where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut buffer: Vec<u8> = Vec::new();
    let mut acc = StreamAccumulator::default();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.send(Err(ProviderError::Cancelled)).await;
                return;
            }
            next = byte_stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
            None => break,
        }

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = match std::str::from_utf8(&raw[..line_end]) {
                Ok(line) => line.trim_end_matches('\r'),
                Err(e) => {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(format!(
                            "invalid UTF-8 in stream: {e}"
                        ))))
                        .await;
                    return;
                }
            };

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                let _ = tx.send(Ok(StreamItem::Final(acc.finish()))).await;
                return;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(chunk) => {
                    if let Some(text) = acc.absorb(chunk)
                        && tx.send(Ok(StreamItem::Chunk(text))).await.is_err()
                    {
                        return; // receiver dropped
                    }
                }
                Err(e) => {
                    trace!(
                        backend = %backend_name,
                        data = %data,
                        error = %e,
                        "Ignoring unparseable SSE chunk"
                    );
                }
            }
        }
    }

    if acc.finish_reason.is_some() {
        debug!(backend = %backend_name, "Stream closed after its finish reason without [DONE]");
        let _ = tx.send(Ok(StreamItem::Final(acc.finish()))).await;
    } else {
        warn!(backend = %backend_name, "Stream closed before the model finished");
        let _ = tx
            .send(Err(ProviderError::StreamInterrupted(
                "connection closed before the response finished".into(),
            )))
            .await;
    }
}

/// Folds SSE deltas into one [`CreateResult`].
#[derive(Default)]
struct StreamAccumulator {
    content: String,
    thought: String,
    tool_calls: BTreeMap<u32, FunctionCall>,
    finish_reason: Option<String>,
    usage: RequestUsage,
}

impl StreamAccumulator {
    /// Take one SSE chunk; returns the text delta to forward, if any.
    fn absorb(&mut self, chunk: StreamResponse) -> Option<String> {
        if let Some(usage) = chunk.usage {
            self.usage = RequestUsage::new(usage.prompt_tokens, usage.completion_tokens);
        }

        let choice = chunk.choices.into_iter().next()?;
        if choice.finish_reason.is_some() {
            self.finish_reason = choice.finish_reason;
        }

        if let Some(reasoning) = choice.delta.reasoning_content {
            self.thought.push_str(&reasoning);
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let call = self.tool_calls.entry(delta.index).or_insert_with(|| FunctionCall {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            });
            if let Some(id) = delta.id {
                call.id = id;
            }
            if let Some(func) = delta.function {
                if let Some(name) = func.name {
                    call.name = name;
                }
                if let Some(args) = func.arguments {
                    call.arguments.push_str(&args);
                }
            }
        }

        let text = choice.delta.content.filter(|c| !c.is_empty())?;
        self.content.push_str(&text);
        Some(text)
    }

    fn finish(self) -> CreateResult {
        let tool_calls: Vec<FunctionCall> = self.tool_calls.into_values().collect();
        let content = if tool_calls.is_empty() {
            MessageContent::Text(self.content)
        } else {
            MessageContent::ToolCalls(tool_calls)
        };
        let finish_reason = match self.finish_reason.as_deref() {
            Some(reason) => FinishReason::from_api(reason),
            None if matches!(content, MessageContent::ToolCalls(_)) => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };
        CreateResult {
            content,
            finish_reason,
            usage: self.usage,
            thought: (!self.thought.is_empty()).then_some(self.thought),
            cached: false,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
