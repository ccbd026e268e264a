//! Error types for the memloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all memloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Function registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Agent loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

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

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Maximum number of retries ({max_retries}) exceeded after {attempts} attempts")]
    RetriesExhausted { attempts: u32, max_retries: u32 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this error is a rate-limit signal from the backend.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ApiError { status_code: 429, .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Edit failed: exceeds {label} character limit ({attempted} > {limit})")]
    Overflow {
        label: String,
        attempted: usize,
        limit: usize,
    },

    #[error("Content not found in {label} memory: {needle:?}")]
    SpanNotFound { label: String, needle: String },

    #[error("No memory block labelled '{0}'")]
    UnknownBlock(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No function named '{0}'")]
    NotFound(String),

    #[error("Function execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid function arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Function '{name}' is declared by the agent but is not in the function library: {available:?}")]
    MissingFunction { name: String, available: Vec<String> },

    #[error("Encountered a function schema with no name: {0}")]
    MalformedSchema(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("First message failed verification after {attempts} attempts")]
    FirstMessageVerification { attempts: u32 },

    #[error("Step cancelled before completion")]
    Cancelled,

    #[error("No messages in context")]
    EmptyContext,

    #[error("Nothing to rewrite: {0}")]
    NothingToRewrite(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn rate_limit_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_rate_limit());
        assert!(
            ProviderError::ApiError {
                status_code: 429,
                message: String::new()
            }
            .is_rate_limit()
        );
        assert!(!ProviderError::Network("reset".into()).is_rate_limit());
        assert!(
            !ProviderError::ApiError {
                status_code: 500,
                message: String::new()
            }
            .is_rate_limit()
        );
    }

    #[test]
    fn overflow_error_names_block_and_sizes() {
        let err = MemoryError::Overflow {
            label: "persona".into(),
            attempted: 2050,
            limit: 2000,
        };
        let text = err.to_string();
        assert!(text.contains("persona"));
        assert!(text.contains("2050"));
        assert!(text.contains("2000"));
    }

    #[test]
    fn missing_function_lists_library() {
        let err = RegistryError::MissingFunction {
            name: "teleport".into(),
            available: vec!["send_message".into()],
        };
        assert!(err.to_string().contains("teleport"));
        assert!(err.to_string().contains("send_message"));
    }
}
