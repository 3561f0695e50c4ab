//! Error types for the agenx domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all agenx operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Model backend error: {0}")]
    Provider(#[from] ProviderError),

    /// A backend failure raised while a specific reasoning mode was running.
    #[error("Dispatch failed in {mode} mode: {source}")]
    Dispatch {
        mode: &'static str,
        #[source]
        source: ProviderError,
    },

    /// No reasoning result was produced by any mode branch.
    #[error("Dispatch invariant violated: {0}")]
    DispatchInvariant(String),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// The turn was cancelled before it completed.
    #[error("Turn cancelled")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Attach the reasoning mode that was running when a backend call failed.
    ///
    /// Cancellation is kept as [`Error::Cancelled`] so callers can tell an
    /// aborted turn from a broken backend.
    pub fn in_mode(mode: &'static str, source: ProviderError) -> Self {
        match source {
            ProviderError::Cancelled => Error::Cancelled,
            source => Error::Dispatch { mode, source },
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// A streaming call ended without its final result.
    #[error("No final model result in streaming mode")]
    MissingFinalResult,

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend call cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}
