//! Options every pacing primitive accepts

use serde::{Deserialize, Serialize};

/// Options shared by all primitives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerOptions {
    /// When false every call is refused and the status is `disabled`
    pub enabled: bool,

    /// Optional identifier used in logs and reports
    pub key: Option<String>,
}

impl Default for PacerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            key: None,
        }
    }
}

impl PacerOptions {
    /// Key for log fields, `-` when unset
    pub fn key_or_default(&self) -> &str {
        self.key.as_deref().unwrap_or("-")
    }
}
