//! ModelBackend trait: the abstraction over language-model backends.
//!
//! A backend takes the conversation as seen by one agent plus the tools it
//! may call, and returns either one complete [`CreateResult`] or a stream
//! of text chunks followed by exactly one [`CreateResult`].
//!
//! Implementations: OpenAI-compatible endpoints, a response cache, and
//! scripted backends in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{Message, MessageContent};

/// Token usage of one or more model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl RequestUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Fold another usage record into this one.
    pub fn accumulate(&mut self, other: &RequestUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other,
}

impl FinishReason {
    /// Map an OpenAI-style finish reason string.
    pub fn from_api(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "tool_calls" | "function_calls" => Self::ToolCalls,
            "length" => Self::Length,
            _ => Self::Other,
        }
    }
}

/// The result of one reasoning step, whichever way it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResult {
    pub content: MessageContent,
    pub finish_reason: FinishReason,
    pub usage: RequestUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default)]
    pub cached: bool,
}

impl CreateResult {
    /// A plain text result that stopped normally and cost nothing.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text(content.into()),
            finish_reason: FinishReason::Stop,
            usage: RequestUsage::default(),
            thought: None,
            cached: false,
        }
    }

    pub fn with_usage(mut self, usage: RequestUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Whether the model asked for tools to be called.
    pub fn wants_tools(&self) -> bool {
        self.finish_reason == FinishReason::ToolCalls
            || matches!(&self.content, MessageContent::ToolCalls(calls) if !calls.is_empty())
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One request to a model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System messages first, then the conversation view
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Optional JSON schema the output must conform to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            json_schema: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// One element of a streamed model response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// An incremental text fragment
    Chunk(String),
    /// The complete result; always the last item
    Final(CreateResult),
}

/// Receiving end of a streamed model response.
pub type ModelStream = mpsc::Receiver<Result<StreamItem, ProviderError>>;

/// The core ModelBackend trait.
///
/// Agents call `create()` or `create_stream()` without knowing which
/// backend is behind them.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "cache").
    fn name(&self) -> &str;

    /// Send a request and get a complete result.
    async fn create(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateResult, ProviderError>;

    /// Send a request and get a stream of chunks ending with the final result.
    ///
    /// Default implementation calls `create()` and sends the result as the
    /// only item.
    async fn create_stream(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        let result = self.create(request, cancel).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(StreamItem::Final(result))).await;
        Ok(rx)
    }
}
