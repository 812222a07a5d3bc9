use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Snapshot published to observers after every repeat-mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepeatStatus {
    pub active: bool,
    pub count: u64,
    pub interval_ms: u64,
}

/// Periodic re-send of one command.
///
/// The next send is due `interval` after the previous one was issued, not on a
/// wall-clock grid. Starting resets the count and makes a send due at once.
#[derive(Debug, Clone)]
pub struct RepeatState {
    command: Option<String>,
    interval: Duration,
    count: u64,
    next_due: Option<Instant>,
    connection: Option<u64>,
}

impl RepeatState {
    pub fn new() -> Self {
        Self {
            command: None,
            interval: DEFAULT_REPEAT_INTERVAL,
            count: 0,
            next_due: None,
            connection: None,
        }
    }

    pub fn start(&mut self, command: String, interval: Duration, now: Instant) {
        self.command = Some(command);
        self.interval = interval.max(MIN_REPEAT_INTERVAL);
        self.count = 0;
        self.next_due = Some(now);
        self.connection = None;
    }

    pub fn stop(&mut self) {
        self.command = None;
        self.next_due = None;
        self.connection = None;
    }

    pub fn is_active(&self) -> bool {
        self.command.is_some()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long until the next send, `None` when inactive.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }

    /// Returns the command if a send is due and schedules the following one.
    /// An interval too large to represent leaves no following send.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        let due = self.next_due?;
        if now < due {
            return None;
        }
        self.next_due = now.checked_add(self.interval);
        self.command.clone()
    }

    /// Connection the repeat is bound to, set by the first successful send.
    pub fn connection(&self) -> Option<u64> {
        self.connection
    }

    /// Count a repeat send that reached the device over `connection`.
    pub fn record_send(&mut self, connection: u64) {
        if self.is_active() {
            self.count += 1;
            self.connection.get_or_insert(connection);
        }
    }

    pub fn status(&self) -> RepeatStatus {
        RepeatStatus {
            active: self.is_active(),
            count: self.count,
            interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for RepeatState {
    fn default() -> Self {
        Self::new()
    }
}
