//! Message domain types.
//!
//! A [`Message`] is one conversational turn: who said it (`source`), what
//! was said (`content`), and optionally how many tokens it cost and the
//! hidden reasoning that produced it. Messages are immutable once they
//! are appended to a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::RequestUsage;

/// The role of a message sender, as seen by the model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human or another agent speaking to this agent
    User,
    /// The model-backed agent itself
    Assistant,
    /// Instructions prefixed before every model call
    System,
    /// Tool execution results
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// The outcome of executing one [`FunctionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExecutionResult {
    /// The call ID this result answers
    pub call_id: String,

    /// Name of the tool that ran
    pub name: String,

    /// Output, or the error text when `is_error` is set
    pub content: String,

    #[serde(default)]
    pub is_error: bool,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

/// What a message carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    ToolCalls(Vec<FunctionCall>),
    ToolResults(Vec<FunctionExecutionResult>),
    MultiModal(Vec<ContentPart>),
}

impl MessageContent {
    /// Plain-text form of the content, as the model or a terminal would see it.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::ToolCalls(calls) => calls
                .iter()
                .map(|c| format!("{}({})", c.name, c.arguments))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::ToolResults(results) => results
                .iter()
                .map(|r| r.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::MultiModal(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::Image { .. } => "<image>".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// True for text without any characters and for empty lists.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::ToolCalls(calls) => calls.is_empty(),
            Self::ToolResults(results) => results.is_empty(),
            Self::MultiModal(parts) => parts.is_empty(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// How the model backend should see this message
    pub role: Role,

    /// The agent (or "user") that produced it
    pub source: String,

    pub content: MessageContent,

    /// Token usage of the model call that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<RequestUsage>,

    /// Hidden reasoning attached to the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, source: impl Into<String>, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            source: source.into(),
            content,
            usage: None,
            thought: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user-role message.
    pub fn user(source: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::build(Role::User, source, content.into())
    }

    /// Create a new assistant-role message.
    pub fn assistant(source: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::build(Role::Assistant, source, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, "system", MessageContent::Text(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_results(source: impl Into<String>, results: Vec<FunctionExecutionResult>) -> Self {
        Self::build(Role::Tool, source, MessageContent::ToolResults(results))
    }

    pub fn with_usage(mut self, usage: RequestUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_thought(mut self, thought: Option<String>) -> Self {
        self.thought = thought;
        self
    }

    /// Plain-text form of the content.
    pub fn text(&self) -> String {
        self.content.to_text()
    }
}
