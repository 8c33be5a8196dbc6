//! Render configuration

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

/// Limits and logging switches for surfaces and the surface system
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Technique switches handled per dispatch before the system stops
    /// rebuilding draw calls
    pub max_technique_switches: u32,
    /// Bad-macro recoveries a surface attempts per dispatch
    pub max_recovery_attempts: u32,
    /// Log pass and technique fallbacks at `info` instead of `debug`
    pub log_fallbacks: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_technique_switches: 16,
            max_recovery_attempts: 4,
            log_fallbacks: true,
        }
    }
}

impl RenderConfig {
    /// Parse a JSON config; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RenderError::Config(e.to_string()))
    }

    /// Log level used for fallback messages
    pub fn fallback_level(&self) -> log::Level {
        if self.log_fallbacks {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}
