use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{PreviewError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// How long a command may stay in flight before it is treated as lost.
    /// Zero disables the timeout.
    pub ack_timeout_ms: u64,
    /// Consecutive negative acks before the listener hears about it.
    /// Zero disables escalation.
    pub nack_escalation_threshold: u32,
    pub diagnostics_capacity: usize,
    pub tick_interval_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5_000,
            nack_escalation_threshold: 3,
            diagnostics_capacity: 64,
            tick_interval_ms: 50,
        }
    }
}

impl PreviewConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PreviewError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PreviewError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::info!("Loaded preview config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(PreviewError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.diagnostics_capacity == 0 {
            return Err(PreviewError::Config(
                "diagnostics_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        (self.ack_timeout_ms > 0).then(|| Duration::from_millis(self.ack_timeout_ms))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
