//! Game room timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings shared by every game actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// How long the turn summary stays up before the turn resolves (default: 5s)
    pub summary_delay_ms: u64,

    /// How often the actor checks its summary deadline (default: 250ms)
    pub tick_interval_ms: u64,

    /// Capacity of each actor's message inbox (default: 100)
    pub inbox_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            summary_delay_ms: 5_000,
            tick_interval_ms: 250,
            inbox_capacity: 100,
        }
    }
}

impl RoomConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("Tick interval must be greater than zero".to_string());
        }

        if self.inbox_capacity == 0 {
            return Err("Inbox capacity must be greater than zero".to_string());
        }

        if self.summary_delay_ms > 60_000 {
            return Err("Summary delay must be at most 60 seconds".to_string());
        }

        Ok(())
    }

    pub fn summary_delay(&self) -> Duration {
        Duration::from_millis(self.summary_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
