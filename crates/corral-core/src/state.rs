//! Agent-observed container state.
//!
//! The `state` field of a container is free text reported by the host agent.
//! Well-known values map to named variants; anything else is preserved
//! verbatim in [`ContainerState::Other`].

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Observed lifecycle state of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerState {
    /// Nothing has been reported yet.
    #[default]
    Unknown,
    /// Waiting in the request queue.
    Queued,
    /// The agent is creating the container.
    Creating,
    /// The container is running.
    Running,
    /// The container is shutting down.
    Stopping,
    /// The container exists but is not running.
    Stopped,
    /// Terminal: the container has been or is being destroyed.
    Destroy,
    /// Any other value reported by the runtime.
    Other(String),
}

impl ContainerState {
    /// Return the canonical wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Queued => "QUEUED",
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Destroy => "DESTROY",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Returns true if the container is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroy)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerState {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl From<String> for ContainerState {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "" | "UNKNOWN" => Self::Unknown,
            "QUEUED" => Self::Queued,
            "CREATING" => Self::Creating,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "DESTROY" => Self::Destroy,
            _ => Self::Other(s),
        }
    }
}

impl From<ContainerState> for String {
    fn from(state: ContainerState) -> Self {
        match state {
            ContainerState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_states_case_insensitively() {
        assert_eq!("running".parse::<ContainerState>().unwrap(), ContainerState::Running);
        assert_eq!("STOPPED".parse::<ContainerState>().unwrap(), ContainerState::Stopped);
        assert_eq!("".parse::<ContainerState>().unwrap(), ContainerState::Unknown);
    }

    #[test]
    fn preserves_unknown_values() {
        let state: ContainerState = "FROZEN".parse().unwrap();
        assert_eq!(state, ContainerState::Other("FROZEN".into()));
        assert_eq!(state.to_string(), "FROZEN");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ContainerState::Destroy).unwrap();
        assert_eq!(json, "\"DESTROY\"");
        let back: ContainerState = serde_json::from_str("\"Running\"").unwrap();
        assert!(back.is_running());
        assert!(ContainerState::Destroy.is_terminal());
    }
}
