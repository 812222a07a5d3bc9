pub mod engine;
pub mod repeat;
pub mod runtime;

pub use engine::{ReadOutcome, UartSession};
pub use repeat::{RepeatState, RepeatStatus};
pub use runtime::{DispatchRequest, UartSessionBuilder, UartSessionHandle};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::serial::{ConnectionConfig, SerialError};

/// Everything the session reports to the presentation side.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A complete line from the device, stamped when it was framed.
    Line { text: String, timestamp: DateTime<Local> },
    Sent { command: String },
    SendFailed { command: String, reason: String },
    Connected { port: String, baud: u32 },
    ConnectFailed { message: String },
    /// The device vanished mid-session. Fired once per connection.
    Disconnected,
    /// The user closed the connection.
    Closed,
}

impl SessionEvent {
    pub fn line(text: impl Into<String>) -> Self {
        SessionEvent::Line { text: text.into(), timestamp: Local::now() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected(ConnectionConfig),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error("Session is shut down")]
    ChannelClosed,

    #[error("Session task failed: {0}")]
    TaskFailed(String),
}

impl SessionError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SessionError::Serial(e) if e.is_disconnect())
    }
}
