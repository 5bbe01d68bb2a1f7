use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use agentrun_core::ControllerConfig;
use agentrun_observe::LoggerConfig;

/// Daemon settings; every section is optional in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DaemonConfig {
    pub logger: LoggerConfig,
    pub controller: ControllerConfig,
    /// Seconds the simulated backend lets a unit-of-work run before reporting success.
    pub simulated_runtime_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            controller: ControllerConfig::default(),
            simulated_runtime_seconds: 2,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}
