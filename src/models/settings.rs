//! Settings Models
//!
//! Streaming configuration stored in streaming.json.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Configuration for the stream session registry and subscription facade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Delay between finalization and listener teardown, in milliseconds
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Capacity of the facade's update broadcast channel
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
}

fn default_grace_period_ms() -> u64 {
    100
}

fn default_update_buffer() -> usize {
    256
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            update_buffer: default_update_buffer(),
        }
    }
}

/// Partial update of [`StreamingConfig`]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamingConfigUpdate {
    pub grace_period_ms: Option<u64>,
    pub update_buffer: Option<usize>,
}

impl StreamingConfig {
    /// Grace period as a `Duration`
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Load from a JSON file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            crate::utils::paths::ensure_dir(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: StreamingConfigUpdate) -> AppResult<()> {
        let mut next = self.clone();
        if let Some(grace) = update.grace_period_ms {
            next.grace_period_ms = grace;
        }
        if let Some(buffer) = update.update_buffer {
            next.update_buffer = buffer;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.update_buffer == 0 {
            return Err(AppError::config("update_buffer must be greater than zero"));
        }
        Ok(())
    }
}
