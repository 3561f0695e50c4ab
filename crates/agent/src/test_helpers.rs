//! Shared test helpers for agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use agenx_core::error::{ProviderError, ToolError};
use agenx_core::message::{FunctionCall, MessageContent};
use agenx_core::provider::*;
use agenx_core::tool::{Tool, ToolResult};
use agenx_core::CancellationToken;
use async_trait::async_trait;

/// A backend that returns a sequence of scripted results.
///
/// Each call returns the next result in the queue and records the request.
/// Panics if more calls are made than results provided.
pub struct ScriptedBackend {
    results: Mutex<VecDeque<CreateResult>>,
    requests: Mutex<Vec<ModelRequest>>,
    chunk_size: Option<usize>,
    drop_final: bool,
    hang: bool,
}

impl ScriptedBackend {
    pub fn new(results: Vec<CreateResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            chunk_size: None,
            drop_final: false,
            hang: false,
        }
    }

    /// Return a single text result.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_result(text)])
    }

    /// Stream text results in chunks of `size` characters.
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Stream the chunks but never the final result.
    pub fn without_final(mut self) -> Self {
        self.drop_final = true;
        self
    }

    /// Never answer; wait for cancellation instead.
    pub fn hanging() -> Self {
        let mut backend = Self::new(vec![]);
        backend.hang = true;
        backend
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ModelRequest) -> CreateResult {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedBackend: no more results (call #{call})"))
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateResult, ProviderError> {
        if self.hang {
            self.requests.lock().unwrap().push(request);
            cancel.cancelled().await;
            return Err(ProviderError::Cancelled);
        }
        Ok(self.next(request))
    }

    async fn create_stream(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        if self.hang {
            self.requests.lock().unwrap().push(request);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _ = tx.send(Ok(StreamItem::Chunk("partial".into()))).await;
                cancel.cancelled().await;
                let _ = tx.send(Err(ProviderError::Cancelled)).await;
            });
            return Ok(rx);
        }

        let result = self.next(request);
        let text = match &result.content {
            MessageContent::Text(text) => text.clone(),
            _ => String::new(),
        };
        let chars: Vec<char> = text.chars().collect();
        let size = self.chunk_size.unwrap_or(chars.len()).max(1);
        let chunks: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
        let drop_final = self.drop_final;

        tokio::spawn(async move {
            for chunk in chunks {
                let _ = tx.send(Ok(StreamItem::Chunk(chunk))).await;
            }
            if !drop_final {
                let _ = tx.send(Ok(StreamItem::Final(result))).await;
            }
        });
        Ok(rx)
    }
}

/// A text result with fixed usage.
pub fn make_text_result(text: &str) -> CreateResult {
    CreateResult::text(text).with_usage(RequestUsage::new(10, 5))
}

/// A result asking for the given tool calls.
pub fn make_tool_call_result(calls: Vec<FunctionCall>) -> CreateResult {
    CreateResult {
        content: MessageContent::ToolCalls(calls),
        finish_reason: FinishReason::ToolCalls,
        usage: RequestUsage::new(10, 5),
        thought: None,
        cached: false,
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> FunctionCall {
    FunctionCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A tool that returns a fixed prediction for any molecule.
pub struct FixedPredictor;

#[async_trait]
impl Tool for FixedPredictor {
    fn name(&self) -> &str {
        "characterize_pchembl_value"
    }

    fn description(&self) -> &str {
        "Returns 6.5 for every molecule"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "smiles": { "type": "string" } },
            "required": ["smiles"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let smiles = arguments["smiles"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'smiles' argument".into()))?;
        Ok(ToolResult::ok(format!(r#"{{"input":"{smiles}","output":6.5}}"#)))
    }
}
