//! Tool trait and the explicit tool registry.
//!
//! Tools are what let agents act: call an ML predictor, query a database,
//! run a calculation. They are collected into a [`ToolRegistry`] at
//! startup and handed to each agent; nothing registers itself globally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::message::{FunctionCall, FunctionExecutionResult};
use crate::provider::ToolDefinition;

/// The output of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "characterize_pchembl_value").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Something that can run the tool calls a model asks for.
///
/// Failures never escape as errors: they come back as a result with
/// `is_error` set so the conversation can continue.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions of every tool this executor can run.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one call.
    async fn execute(&self, call: &FunctionCall, cancel: &CancellationToken)
    -> FunctionExecutionResult;
}

/// A registry of available tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A new registry holding only the named tools.
    ///
    /// Unknown names are skipped with a warning.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> ToolRegistry {
        let mut selected = ToolRegistry::new();
        for name in names {
            match self.tools.get(name.as_ref()) {
                Some(tool) => selected.register(tool.clone()),
                None => warn!(tool = name.as_ref(), "Tool not found in available tools"),
            }
        }
        selected
    }

    async fn run(&self, call: &FunctionCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let arguments: serde_json::Value = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.arguments)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };
        tool.execute(arguments).await
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    async fn execute(
        &self,
        call: &FunctionCall,
        cancel: &CancellationToken,
    ) -> FunctionExecutionResult {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: "cancelled".into(),
            }),
            outcome = self.run(call) => outcome,
        };

        match outcome {
            Ok(result) => {
                debug!(tool = %call.name, success = result.success, "Tool executed");
                FunctionExecutionResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: result.output,
                    is_error: !result.success,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                FunctionExecutionResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: format!("Error: {e}"),
                    is_error: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(ToolResult::ok(text))
        }
    }

    fn call(name: &str, arguments: &str) -> FunctionCall {
        FunctionCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "echo");
    }

    #[test]
    fn subset_skips_unknown_names() {
        let subset = registry().subset(&["echo", "missing"]);
        assert_eq!(subset.names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn execute_success() {
        let result = registry()
            .execute(&call("echo", r#"{"text":"hello"}"#), &CancellationToken::new())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "hello");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn missing_tool_is_encoded_as_error_result() {
        let result = registry()
            .execute(&call("nonexistent", "{}"), &CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Tool not found"));
    }

    #[tokio::test]
    async fn bad_arguments_are_encoded_as_error_result() {
        let result = registry()
            .execute(&call("echo", "{not json"), &CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Invalid tool arguments"));
    }
}
