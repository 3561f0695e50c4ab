//! Built-in tool implementations for agenx.
//!
//! Tools give the agents the ability to run virtual experiments: each
//! one forwards a candidate (molecule, material) to a property-prediction
//! service and reports the predicted value.

pub mod predictor;

use std::sync::Arc;

use agenx_config::ToolsConfig;
use agenx_core::tool::ToolRegistry;

pub use predictor::{PredictorField, PredictorTool};

/// Create the registry of every built-in tool, pointed at the configured services.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(PredictorTool::pchembl(
        &config.pchembl_url,
        config.timeout_secs,
    )));
    registry.register(Arc::new(PredictorTool::tc(&config.tc_url, config.timeout_secs)));
    registry
}
