use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Result;

/// Runtime tunables for a session. Every field has a default, so a settings
/// file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Outbound entries kept before the oldest is evicted.
    pub write_queue_capacity: usize,
    pub read_chunk_size: usize,
    /// Reader sleep in microseconds when connected and idle. Zero only
    /// yields to the scheduler.
    pub idle_backoff_us: u64,
    /// Reader sleep while no port is open.
    pub disconnected_backoff_ms: u64,
    /// Longest the writer blocks waiting for the next request.
    pub writer_wait_ms: u64,
    /// Events handed to the log sink per presentation cycle.
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    /// Lines retained by the log sink for display.
    pub history_capacity: usize,
    pub default_repeat_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            write_queue_capacity: 1000,
            read_chunk_size: 4096,
            idle_backoff_us: 500,
            disconnected_backoff_ms: 100,
            writer_wait_ms: 100,
            batch_size: 100,
            batch_interval_ms: 10,
            history_capacity: 1000,
            default_repeat_interval_ms: 1000,
        }
    }
}

impl SessionSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: SessionSettings = serde_json::from_str(&raw)?;
        log::debug!("Loaded session settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }

    pub fn disconnected_backoff(&self) -> Duration {
        Duration::from_millis(self.disconnected_backoff_ms.max(1))
    }

    pub fn writer_wait(&self) -> Duration {
        Duration::from_millis(self.writer_wait_ms.max(1))
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms.max(1))
    }

    pub fn default_repeat_interval(&self) -> Duration {
        Duration::from_millis(self.default_repeat_interval_ms)
    }
}
