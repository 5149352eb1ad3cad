//! Lifecycle status shared by all pacing primitives

use serde::{Deserialize, Serialize};

/// Lifecycle state of a pacing primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PacerStatus {
    /// Enabled but not actively processing
    #[default]
    Idle,
    /// Work is scheduled but has not started yet
    Pending,
    /// A single execution is in progress
    Executing,
    /// The dispatcher is draining work
    Running,
    /// `enabled` is false; every call is refused
    Disabled,
}

impl PacerStatus {
    /// Status for a primitive that is either draining or parked
    pub fn from_flags(enabled: bool, running: bool) -> Self {
        match (enabled, running) {
            (false, _) => Self::Disabled,
            (true, true) => Self::Running,
            (true, false) => Self::Idle,
        }
    }
}

impl std::fmt::Display for PacerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Pending => write!(f, "pending"),
            Self::Executing => write!(f, "executing"),
            Self::Running => write!(f, "running"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for PacerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "pending" => Ok(Self::Pending),
            "executing" => Ok(Self::Executing),
            "running" => Ok(Self::Running),
            "disabled" => Ok(Self::Disabled),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}
