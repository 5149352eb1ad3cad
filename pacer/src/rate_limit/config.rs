//! Rate limiter configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::PacerOptions;
use crate::error::{PacerError, PacerResult};

/// How executions are counted against the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    /// Window starts at the first execution and resets once it has elapsed
    #[default]
    Fixed,
    /// Executions within the trailing window count
    Sliding,
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Sliding => write!(f, "sliding"),
        }
    }
}

impl std::str::FromStr for WindowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "sliding" => Ok(Self::Sliding),
            _ => Err(format!("Unknown window type: {}", s)),
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RateLimiterConfig {
    #[serde(flatten)]
    pub pacer: PacerOptions,

    /// Executions allowed per window
    pub limit: u32,

    /// Window length in milliseconds
    pub window_ms: u64,

    pub window_type: WindowType,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            pacer: PacerOptions::default(),
            limit: 10,
            window_ms: 1_000,
            window_type: WindowType::Fixed,
        }
    }
}

impl RateLimiterConfig {
    /// Window length as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> PacerResult<()> {
        if self.limit == 0 {
            return Err(PacerError::InvalidOptions("limit must be at least 1".to_string()));
        }
        if self.window_ms == 0 {
            return Err(PacerError::InvalidOptions("window-ms must be at least 1".to_string()));
        }
        Ok(())
    }
}
