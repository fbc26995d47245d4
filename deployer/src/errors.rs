//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An external tool (git, shell, powershell) exited non-zero
    #[error("{tool} failed: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Resource missing: {0}")]
    ResourceMissing(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        DeployError::ToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Failures that end a deploy as `Failed` without being an unexpected fault
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            DeployError::ToolFailure { .. }
                | DeployError::Timeout(_)
                | DeployError::ResourceMissing(_)
        )
    }
}
