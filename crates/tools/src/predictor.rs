//! Predictor tools: calls to the property-prediction inference services.
//!
//! Each service exposes `POST /predict` taking a small JSON object and
//! answering `{"input", "output", "success", "error"}`, plus
//! `GET /health`. One [`PredictorTool`] wraps one service.

use std::time::Duration;

use agenx_core::error::ToolError;
use agenx_core::tool::{Tool, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// An input field of a predictor service.
#[derive(Debug, Clone)]
pub struct PredictorField {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// A tool backed by a remote `/predict` endpoint.
pub struct PredictorTool {
    name: String,
    description: String,
    fields: Vec<PredictorField>,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

/// Body returned by the inference services.
#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    input: serde_json::Value,
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
}

impl PredictorTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<PredictorField>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    /// pChEMBL activity prediction from a SMILES string.
    pub fn pchembl(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self::new(
            "characterize_pchembl_value",
            "Predict the pChEMBL value (negative log of molar activity) of a molecule \
             given as a SMILES string. Higher values mean stronger activity.",
            vec![PredictorField {
                name: "smiles",
                description: "SMILES string of the molecule, e.g. CC(=O)Oc1ccccc1C(=O)O",
                required: true,
            }],
            base_url,
            timeout_secs,
        )
    }

    /// Superconductor critical temperature prediction from a formula.
    pub fn tc(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self::new(
            "characterize_Tc_value",
            "Predict the superconducting critical temperature (Tc, in Kelvin) of a material \
             given its chemical formula and optional structure type code.",
            vec![
                PredictorField {
                    name: "element",
                    description: "Chemical formula, e.g. Ba0.2La1.8Cu1O4-Y",
                    required: true,
                },
                PredictorField {
                    name: "str3",
                    description: "Structure type code: T, C, H, O or M",
                    required: false,
                },
            ],
            base_url,
            timeout_secs,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check the service answers `GET /health`.
    pub async fn health_check(&self) -> Result<bool, ToolError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.failure(e.to_string()))?;
        Ok(response.status().is_success())
    }

    fn failure(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Pick the declared fields out of the arguments.
    fn payload(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let mut payload = serde_json::Map::new();
        for field in &self.fields {
            match arguments.get(field.name).and_then(|v| v.as_str()) {
                Some(value) if !value.trim().is_empty() => {
                    payload.insert(field.name.into(), value.trim().into());
                }
                _ if field.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "Missing '{}' argument",
                        field.name
                    )));
                }
                _ => {}
            }
        }
        Ok(serde_json::Value::Object(payload))
    }
}

#[async_trait]
impl Tool for PredictorTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.to_string(),
                    serde_json::json!({ "type": "string", "description": f.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let payload = self.payload(&arguments)?;
        let url = format!("{}/predict", self.base_url);
        debug!(tool = %self.name, url = %url, "Calling predictor service");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: self.name.clone(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    self.failure(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        // Error bodies share the success shape, so parse before judging the status
        let parsed: Option<PredictResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(p) if status.is_success() && p.success => {
                let data = serde_json::json!({ "input": p.input, "output": p.output });
                Ok(ToolResult {
                    success: true,
                    output: serde_json::to_string(&data).unwrap_or_default(),
                    data: Some(data),
                })
            }
            Some(p) if !p.error.is_empty() => Err(self.failure(p.error)),
            _ => Err(self.failure(format!("HTTP {}: {}", status.as_u16(), body.trim()))),
        }
    }
}
