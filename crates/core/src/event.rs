//! Stream events: everything an agent or a team emits while it runs.
//!
//! A well-formed stream is any number of non-terminal events followed by
//! exactly one [`StreamEvent::Terminal`]. Producers run as spawned tasks
//! and push events through an [`EventSender`]; consumers pull them from
//! the paired [`EventStream`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Error;
use crate::memory::MemoryContent;
use crate::message::{FunctionCall, FunctionExecutionResult, Message};
use crate::provider::RequestUsage;

/// The final answer of one agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The message the agent contributes to the conversation
    pub chat_message: Message,

    /// Events produced on the way (memory, thoughts, tool traffic)
    #[serde(default)]
    pub inner_messages: Vec<StreamEvent>,

    /// Usage of every model call made during the turn
    #[serde(default)]
    pub usage: RequestUsage,
}

/// The final outcome of a team run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Every chat message of the run, in order
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// The payload of the terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalResult {
    Response(Response),
    TaskResult(TaskResult),
}

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial text from a streaming model call.
    Chunk { source: String, content: String },

    /// Hidden reasoning attached to a model result.
    Thought { source: String, content: String },

    /// Memory contents folded into the context.
    MemoryQuery {
        source: String,
        contents: Vec<MemoryContent>,
    },

    /// The model asked for tools.
    ToolCallRequest {
        source: String,
        calls: Vec<FunctionCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<RequestUsage>,
    },

    /// Tool calls finished (successfully or not).
    ToolCallExecution {
        source: String,
        results: Vec<FunctionExecutionResult>,
    },

    /// Formatted summary of tool results, used when there is no reflection.
    ToolCallSummary { source: String, content: String },

    /// A chat message produced by a team participant.
    Chat { message: Message },

    /// An agent is waiting for human input.
    UserInputRequested { source: String, request_id: String },

    /// A team run is stopping.
    Termination { source: String, reason: String },

    /// The unique last event of a stream.
    Terminal { result: TerminalResult },
}

impl StreamEvent {
    /// Event kind name, used for console headers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "ModelClientStreamingChunkEvent",
            Self::Thought { .. } => "ThoughtEvent",
            Self::MemoryQuery { .. } => "MemoryQueryEvent",
            Self::ToolCallRequest { .. } => "ToolCallRequestEvent",
            Self::ToolCallExecution { .. } => "ToolCallExecutionEvent",
            Self::ToolCallSummary { .. } => "ToolCallSummaryMessage",
            Self::Chat { .. } => "TextMessage",
            Self::UserInputRequested { .. } => "UserInputRequestedEvent",
            Self::Termination { .. } => "GroupChatTermination",
            Self::Terminal {
                result: TerminalResult::Response(_),
            } => "Response",
            Self::Terminal {
                result: TerminalResult::TaskResult(_),
            } => "TaskResult",
        }
    }

    /// The agent the event came from.
    pub fn source(&self) -> &str {
        match self {
            Self::Chunk { source, .. }
            | Self::Thought { source, .. }
            | Self::MemoryQuery { source, .. }
            | Self::ToolCallRequest { source, .. }
            | Self::ToolCallExecution { source, .. }
            | Self::ToolCallSummary { source, .. }
            | Self::UserInputRequested { source, .. }
            | Self::Termination { source, .. } => source,
            Self::Chat { message } => &message.source,
            Self::Terminal {
                result: TerminalResult::Response(response),
            } => &response.chat_message.source,
            Self::Terminal {
                result: TerminalResult::TaskResult(_),
            } => "team",
        }
    }

    /// Model usage carried by the event, if any.
    pub fn usage(&self) -> Option<RequestUsage> {
        match self {
            Self::ToolCallRequest { usage, .. } => *usage,
            Self::Chat { message } => message.usage,
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    pub fn response(response: Response) -> Self {
        Self::Terminal {
            result: TerminalResult::Response(response),
        }
    }

    pub fn task_result(result: TaskResult) -> Self {
        Self::Terminal {
            result: TerminalResult::TaskResult(result),
        }
    }
}

/// Producer half of an event stream.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Result<StreamEvent, Error>>,
}

impl EventSender {
    /// Emit one event. A consumer that went away is not an error.
    pub async fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(Ok(event)).await;
    }

    /// Report a fatal failure; the consumer sees it as the last item.
    pub async fn fail(&self, error: Error) {
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Consumer half of an event stream.
pub struct EventStream {
    rx: mpsc::Receiver<Result<StreamEvent, Error>>,
}

impl EventStream {
    /// Create a bounded sender/stream pair.
    pub fn channel(capacity: usize) -> (EventSender, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (EventSender { tx }, EventStream { rx })
    }

    pub async fn recv(&mut self) -> Option<Result<StreamEvent, Error>> {
        self.rx.recv().await
    }

    /// Drain the stream, stopping at the first failure.
    pub async fn collect_events(mut self) -> Result<Vec<StreamEvent>, Error> {
        let mut events = Vec::new();
        while let Some(item) = self.rx.recv().await {
            events.push(item?);
        }
        Ok(events)
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
