//! Error types for the conversant runtime
//!
//! This module provides comprehensive error types using thiserror for all
//! runtime operations. Cancellation is deliberately NOT represented here: per
//! the dispatcher's contract, a cancelled task is swallowed rather than
//! surfaced as an error (see [`crate::dispatcher::SessionDispatcher`]).

use crate::tool::ToolId;
use crate::types::{GuidelineConnectionId, GuidelineId, SessionId};
use thiserror::Error;

/// Main error type for runtime operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgentError {
    /// LLM provider error
    #[error("LLM provider error: {0}")]
    LLMProvider(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session already exists
    #[error("Session already exists: {0}")]
    SessionAlreadyExists(SessionId),

    /// Guideline not found
    #[error("Guideline not found: {0}")]
    GuidelineNotFound(GuidelineId),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(#[from] ToolError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A schematic generator could not produce a parseable typed object
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound HTTP call failed (tool plugin, OpenAPI service)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage-related errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// Connection failed
    #[error("Storage connection failed: {0}")]
    Connection(String),

    /// Query failed
    #[error("Storage query failed: {0}")]
    Query(String),

    /// Serialization failed
    #[error("Storage serialization failed: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Storage deserialization failed: {0}")]
    Deserialization(String),

    /// Resource not found. Surfaced as `item_not_found` to external callers;
    /// the pipeline never observes this because it pre-validates lookups.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Storage backend not available
    #[error("Storage backend not available: {0}")]
    BackendUnavailable(String),

    /// Internal storage error
    #[error("Internal storage error: {0}")]
    Internal(String),
}

/// Guideline-related errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GuidelineError {
    /// Invalid guideline condition
    #[error("Invalid guideline condition: {0}")]
    InvalidCondition(String),

    /// Invalid guideline action
    #[error("Invalid guideline action: {0}")]
    InvalidAction(String),

    /// Guideline not found
    #[error("Guideline not found: {0}")]
    NotFound(GuidelineId),

    /// Guideline already exists
    #[error("Guideline already exists: {0}")]
    AlreadyExists(GuidelineId),

    /// A proposed connection referenced an unknown endpoint
    #[error("Guideline connection references unknown guideline: {0}")]
    UnknownConnectionEndpoint(GuidelineId),

    /// A connection with this id was not found
    #[error("Guideline connection not found: {0}")]
    ConnectionNotFound(GuidelineConnectionId),

    /// Internal guideline error
    #[error("Internal guideline error: {0}")]
    Internal(String),
}

/// Tool-related errors. `tool_execution_error` in the spec's vocabulary maps
/// to [`ToolError::ExecutionFailed`]; it is recorded in a tool event's result
/// slot and does not abort the pipeline iteration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ToolError {
    /// Tool not found on the resolved service
    #[error("Tool not found: {0}")]
    NotFound(ToolId),

    /// Tool already registered under this id
    #[error("Tool already exists: {0}")]
    AlreadyExists(ToolId),

    /// Tool execution timeout
    #[error("Tool execution timeout after {timeout_ms}ms: {tool_id}")]
    Timeout { tool_id: ToolId, timeout_ms: u64 },

    /// Tool execution failed. This is the spec's `tool_execution_error`.
    #[error("Tool execution failed for {tool_id}: {message}")]
    ExecutionFailed { tool_id: ToolId, message: String },

    /// Arguments did not satisfy the tool's declared parameter schema
    #[error("Invalid tool parameters for {tool_id}: {message}")]
    InvalidParameters { tool_id: ToolId, message: String },

    /// A local tool could not be resolved (dynamic dispatch equivalent of a
    /// Python import failure)
    #[error("Tool import failed for {tool_id}: {message}")]
    ImportFailed { tool_id: ToolId, message: String },

    /// A plugin stream ended without a terminal result chunk
    #[error("Unexpected response from tool service (no result chunk): {0}")]
    NoResultChunk(ToolId),

    /// Tool output deserialization failed
    #[error("Tool output deserialization failed: {0}")]
    OutputDeserialization(String),

    /// Internal tool error
    #[error("Internal tool error: {0}")]
    Internal(String),
}

/// Schematic-generator errors. The spec's `generation_error`: the generator
/// tries a strict JSON parse, then a JSON-finder fallback; if both fail the
/// error propagates and aborts the current pipeline iteration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GenerationError {
    /// The backend returned text that did not parse as JSON even after the
    /// JSON-finder fallback
    #[error("Could not parse a JSON object from generator output: {0}")]
    UnparseableOutput(String),

    /// The backend returned valid JSON but it failed schema validation
    #[error("Generated JSON did not match expected schema: {0}")]
    SchemaMismatch(String),

    /// Every backend in the fallback chain failed; carries the last error
    #[error("All generator backends failed; last error: {0}")]
    FallbackExhausted(String),

    /// Underlying provider transport error
    #[error("Generator backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Type alias for runtime Result
pub type Result<T> = std::result::Result<T, AgentError>;

/// Type alias for Storage Result
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Type alias for Guideline Result
pub type GuidelineResult<T> = std::result::Result<T, GuidelineError>;

/// Type alias for Tool Result
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Type alias for Generation Result
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let session_id = SessionId::new();
        let err = AgentError::SessionNotFound(session_id);
        let display = format!("{}", err);
        assert!(display.contains("Session not found"));
        assert!(display.contains(&session_id.to_string()));
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection("connection refused".to_string());
        let display = format!("{}", err);
        assert!(display.contains("Storage connection failed"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_guideline_error_display() {
        let guideline_id = GuidelineId::new();
        let err = GuidelineError::NotFound(guideline_id);
        let display = format!("{}", err);
        assert!(display.contains("Guideline not found"));
        assert!(display.contains(&guideline_id.to_string()));
    }

    #[test]
    fn test_tool_error_timeout_display() {
        let tool_id = ToolId::new("local", "test_tool");
        let err = ToolError::Timeout {
            tool_id: tool_id.clone(),
            timeout_ms: 5000,
        };
        let display = format!("{}", err);
        assert!(display.contains("Tool execution timeout"));
        assert!(display.contains("5000ms"));
        assert!(display.contains(&tool_id.to_string()));
    }

    #[test]
    fn test_tool_error_execution_failed_display() {
        let tool_id = ToolId::new("local", "test_tool");
        let err = ToolError::ExecutionFailed {
            tool_id: tool_id.clone(),
            message: "API call failed".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("Tool execution failed"));
        assert!(display.contains("API call failed"));
        assert!(display.contains(&tool_id.to_string()));
    }

    #[test]
    fn test_generation_error_fallback_exhausted() {
        let err = GenerationError::FallbackExhausted("timeout on all backends".to_string());
        let display = format!("{}", err);
        assert!(display.contains("All generator backends failed"));
    }

    #[test]
    fn test_error_conversion_storage_to_agent() {
        let storage_err = StorageError::Connection("test".to_string());
        let agent_err: AgentError = storage_err.into();
        assert!(matches!(agent_err, AgentError::Storage(_)));
    }

    #[test]
    fn test_error_conversion_tool_to_agent() {
        let tool_err = ToolError::NotFound(ToolId::new("local", "x"));
        let agent_err: AgentError = tool_err.into();
        assert!(matches!(agent_err, AgentError::ToolExecution(_)));
    }

    #[test]
    fn test_error_conversion_generation_to_agent() {
        let gen_err = GenerationError::UnparseableOutput("not json".to_string());
        let agent_err: AgentError = gen_err.into();
        assert!(matches!(agent_err, AgentError::Generation(_)));
    }

    #[test]
    fn test_result_type_aliases() {
        fn returns_result() -> Result<()> {
            Ok(())
        }

        fn returns_storage_result() -> StorageResult<()> {
            Ok(())
        }

        fn returns_guideline_result() -> GuidelineResult<()> {
            Ok(())
        }

        fn returns_tool_result() -> ToolResult<()> {
            Ok(())
        }

        assert!(returns_result().is_ok());
        assert!(returns_storage_result().is_ok());
        assert!(returns_guideline_result().is_ok());
        assert!(returns_tool_result().is_ok());
    }
}
