//! Client session configuration.

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long an attempt may wait for its result before failing (milliseconds).
    pub attempt_timeout_ms: u64,

    /// Capacity of the command channel feeding the session loop.
    pub command_capacity: usize,

    /// Capacity of the event channel read by game code.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 2_000,
            command_capacity: 32,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> ClientResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.attempt_timeout_ms == 0 {
            return Err(ClientError::Config("attempt_timeout_ms must be non-zero".into()));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(ClientError::Config(
                "channel capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}
