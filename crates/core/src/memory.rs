//! Memory trait: extra knowledge folded into an agent's context per turn.
//!
//! Before each model call the agent asks its memories for content
//! relevant to the current view. Whatever comes back is surfaced as a
//! `MemoryQuery` event and staged as a system message for the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::MemoryError;
use crate::message::Message;

/// A single piece of remembered content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryContent {
    pub content: String,

    /// Free-form metadata (origin, tags, scores)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A memory store consulted once per turn.
#[async_trait]
pub trait Memory: Send + Sync {
    /// A human-readable name for this memory.
    fn name(&self) -> &str;

    /// Return the contents that should be added to the context for this view.
    async fn update_context(&self, view: &[Message]) -> Result<Vec<MemoryContent>, MemoryError>;

    /// Store a new piece of content.
    async fn add(&self, content: MemoryContent) -> Result<(), MemoryError>;
}

/// Render memory contents as the text of a system message.
pub fn memory_context_text(contents: &[MemoryContent]) -> String {
    let mut text = String::from("\nRelevant memory content (in chronological order):\n");
    for (i, item) in contents.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, item.content));
    }
    text
}

/// An in-process list memory that always returns everything it holds.
#[derive(Default)]
pub struct ListMemory {
    name: String,
    contents: RwLock<Vec<MemoryContent>>,
}

impl ListMemory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.contents.read().await.len()
    }
}

#[async_trait]
impl Memory for ListMemory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn update_context(&self, _view: &[Message]) -> Result<Vec<MemoryContent>, MemoryError> {
        Ok(self.contents.read().await.clone())
    }

    async fn add(&self, content: MemoryContent) -> Result<(), MemoryError> {
        self.contents.write().await.push(content);
        Ok(())
    }
}
