//! Error types for warden-agent

use thiserror::Error;
use warden_cpu_guard::GuardError;
use warden_detect::DetectError;

/// Agent-level errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// CPU guard error
    #[error("CPU guard error: {0}")]
    Guard(#[from] GuardError),

    /// Detection setup error
    #[error("Detection error: {0}")]
    Detect(#[from] DetectError),

    /// Logging could not be initialized
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
