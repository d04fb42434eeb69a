// Core configuration

use crate::error::{BreakpointError, BreakpointResult};
use crate::types::SuspendPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Install a location breakpoint instead of a method entry request when
    /// the entry method resolves to a concrete location
    pub prefer_location_requests: bool,
    /// Repair install count and expired state of restored breakpoints
    pub reset_at_startup: bool,
    pub suspend_policy: SuspendPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            prefer_location_requests: true,
            reset_at_startup: true,
            suspend_policy: SuspendPolicy::EventThread,
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> BreakpointResult<Self> {
        serde_json::from_str(json).map_err(|e| BreakpointError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> BreakpointResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BreakpointError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }
}
