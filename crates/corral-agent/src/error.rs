//! Agent error types.

use thiserror::Error;

use crate::client::ClientError;
use crate::runtime::RuntimeError;

/// Errors that can end an agent cycle or command.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Talking to the control API failed.
    #[error("control API: {0}")]
    Client(#[from] ClientError),

    /// The container runtime failed.
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),

    /// The configuration file is missing or invalid.
    #[error("config: {0}")]
    Config(String),

    /// Local state could not be read or written.
    #[error("state: {0}")]
    State(String),
}

impl AgentError {
    /// Returns true if the next cycle may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) => e.is_transient(),
            Self::Runtime(_) | Self::State(_) => true,
            Self::Config(_) => false,
        }
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
