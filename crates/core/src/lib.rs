//! # agenx core
//!
//! Domain types, traits, and error definitions for the agenx multi-agent
//! conversation loop. Every other crate in the workspace depends inward on
//! this one.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model backend, tool executor, memory) is a
//! trait here. Implementations live in their respective crates, so tests
//! can swap in scripted stand-ins without touching the agents.

pub mod context;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{ConversationContext, TurnBuffer};
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{EventSender, EventStream, Response, StreamEvent, TaskResult, TerminalResult};
pub use memory::{ListMemory, Memory, MemoryContent};
pub use message::{ContentPart, FunctionCall, FunctionExecutionResult, Message, MessageContent, Role};
pub use provider::{
    CreateResult, FinishReason, ModelBackend, ModelRequest, ModelStream, RequestUsage, StreamItem,
    ToolDefinition,
};
pub use tokio_util::sync::CancellationToken;
pub use tool::{Tool, ToolExecutor, ToolRegistry, ToolResult};
