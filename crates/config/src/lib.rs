//! Configuration loading, validation, and result persistence for agenx.
//!
//! Loads configuration from `~/.agenx/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agenx/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stream model output as partial chunks
    #[serde(default)]
    pub stream: bool,

    /// Memoise identical model requests
    #[serde(default)]
    pub cache: bool,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub team: TeamConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub results: ResultsConfig,
}

fn default_model() -> String {
    "gpt-4o".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream", &self.stream)
            .field("cache", &self.cache)
            .field("planner", &self.planner)
            .field("agents", &self.agents)
            .field("team", &self.team)
            .field("console", &self.console)
            .field("tools", &self.tools)
            .field("results", &self.results)
            .finish()
    }
}

/// How the planner reasons each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_planner_name")]
    pub name: String,

    /// Run rule-based (principle-guided) reasoning
    #[serde(default)]
    pub principled: bool,

    /// Run model-based reasoning
    #[serde(default = "default_true")]
    pub prompted: bool,

    /// Re-invoke the model once after tool results are in
    #[serde(default)]
    pub reflect_on_tool_use: bool,

    /// Placeholders: {tool_name}, {arguments}, {result}, {is_error}
    #[serde(default = "default_summary_format")]
    pub tool_call_summary_format: String,

    /// Keep only the last N messages in the model view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Principles used by the rule-based reasoner
    #[serde(default = "default_principles")]
    pub principles: Vec<String>,

    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_planner_name() -> String {
    "Planner_Agent".into()
}
fn default_true() -> bool {
    true
}
fn default_summary_format() -> String {
    "{result}".into()
}
fn default_principles() -> Vec<String> {
    vec![
        "Every hypothesis must be testable with the available tools.".into(),
        "Change one structural feature at a time so effects can be attributed.".into(),
        "Prefer refining the best validated candidate over starting afresh.".into(),
    ]
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            name: default_planner_name(),
            principled: false,
            prompted: true,
            reflect_on_tool_use: false,
            tool_call_summary_format: default_summary_format(),
            buffer_size: None,
            system_message: None,
            principles: default_principles(),
            tools: vec![],
        }
    }
}

/// What kind of participant an agent entry creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Hypothesis,
    Experiment,
    UserProxy,
}

/// One team participant besides the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub role: AgentRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tool names this agent may call
    #[serde(default)]
    pub tools: Vec<String>,

    /// Model override for this agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            name: "Hypothesis_Agent".into(),
            role: AgentRole::Hypothesis,
            system_message: None,
            description: None,
            tools: vec![],
            model: None,
        },
        AgentConfig {
            name: "Experiment_Agent".into(),
            role: AgentRole::Experiment,
            system_message: None,
            description: None,
            tools: vec!["characterize_pchembl_value".into()],
            model: None,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// A chat message containing this text ends the run
    #[serde(default = "default_termination_text")]
    pub termination_text: String,
}

fn default_max_turns() -> usize {
    20
}
fn default_termination_text() -> String {
    "TERMINATE".into()
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            termination_text: default_termination_text(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Print summary blocks with token usage and duration
    #[serde(default)]
    pub output_stats: bool,
}

/// Endpoints of the ML inference services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_pchembl_url")]
    pub pchembl_url: String,

    #[serde(default = "default_tc_url")]
    pub tc_url: String,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_pchembl_url() -> String {
    "http://127.0.0.1:12500".into()
}
fn default_tc_url() -> String {
    "http://127.0.0.1:12502".into()
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pchembl_url: default_pchembl_url(),
            tc_url: default_tc_url(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsConfig {
    /// Directory for run results; nothing is saved when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.agenx/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `AGENX_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `AGENX_MODEL`
    /// - `AGENX_BASE_URL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("AGENX_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("AGENX_MODEL") {
            config.default_model = model;
        }

        if let Ok(url) = std::env::var("AGENX_BASE_URL") {
            config.base_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agenx")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.team.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "team.max_turns must be at least 1".into(),
            ));
        }

        if self.planner.buffer_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "planner.buffer_size must be at least 1 when set".into(),
            ));
        }

        let mut names: Vec<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
        names.push(&self.planner.name);
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationError(format!(
                "agent name '{}' is used more than once",
                pair[0]
            )));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve `requested` tool names against the ones that exist.
    ///
    /// Unknown names are dropped with a warning.
    pub fn tools_for(requested: &[String], available: &[&str]) -> Vec<String> {
        requested
            .iter()
            .filter(|name| {
                let known = available.contains(&name.as_str());
                if !known {
                    tracing::warn!(tool = %name, "Tool not found in available tools");
                }
                known
            })
            .cloned()
            .collect()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: None,
            stream: false,
            cache: false,
            planner: PlannerConfig::default(),
            agents: default_agents(),
            team: TeamConfig::default(),
            console: ConsoleConfig::default(),
            tools: ToolsConfig::default(),
            results: ResultsConfig::default(),
        }
    }
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn save_results(value: &serde_json::Value, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: parent.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::info!("Results saved to {}", path.display());
    Ok(())
}

/// Snapshot the configuration next to the results of a run.
pub fn init_results(save_dir: &Path, config: &AppConfig) -> Result<PathBuf, ConfigError> {
    let mut snapshot = config.clone();
    snapshot.api_key = None;
    let value = serde_json::to_value(&snapshot).map_err(|e| ConfigError::WriteError {
        path: save_dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let path = save_dir.join("config.json");
    save_results(&value, &path)?;
    Ok(path)
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },
}
