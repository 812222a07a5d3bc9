//! Presentation side of a session: formatting, history, log files.
pub mod file;
pub mod handler;

pub use file::{log_file_name, LogFile, DEFAULT_LOG_LABEL};
pub use handler::{find_matches, LogHandler};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::session::SessionEvent;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Receives session events in batches from the presentation task.
pub trait LogSink: Send {
    fn write_batch(&mut self, events: &[SessionEvent]);
}

/// Lets the front end keep a handle on a sink the presentation task owns.
impl<T: LogSink> LogSink for Arc<Mutex<T>> {
    fn write_batch(&mut self, events: &[SessionEvent]) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write_batch(events);
    }
}

/// Keeps every batch as delivered.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub batches: Vec<Vec<SessionEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> impl Iterator<Item = &SessionEvent> {
        self.batches.iter().flatten()
    }
}

impl LogSink for CollectingSink {
    fn write_batch(&mut self, events: &[SessionEvent]) {
        self.batches.push(events.to_vec());
    }
}

/// One display/log line for an event.
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Line { text, timestamp } => {
            format!("{} - {}", timestamp.format(TIMESTAMP_FORMAT), text)
        }
        SessionEvent::Sent { command } => format!("Sent: {}", command),
        SessionEvent::SendFailed { reason, .. } => format!("Send failed: {}", reason),
        SessionEvent::Connected { port, baud } => format!("Connected to {} at {} baud", port, baud),
        SessionEvent::ConnectFailed { message } => format!("Connection error: {}", message),
        SessionEvent::Disconnected => "Serial port disconnected.".to_string(),
        SessionEvent::Closed => "Connection closed.".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Log directory does not exist: {0}")]
    DirectoryMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    #[test]
    fn test_line_format() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let event = SessionEvent::Line { text: "ready".into(), timestamp };
        assert_eq!(format_event(&event), "2024-03-09 07:05:01 - ready");
    }

    #[test]
    fn test_status_formats() {
        assert_eq!(format_event(&SessionEvent::Sent { command: "LED ON".into() }), "Sent: LED ON");
        assert_eq!(format_event(&SessionEvent::Disconnected), "Serial port disconnected.");
        assert_eq!(
            format_event(&SessionEvent::ConnectFailed { message: "busy".into() }),
            "Connection error: busy"
        );
    }
}
