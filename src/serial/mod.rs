pub mod framer;
pub mod interface;
pub mod mock;
pub mod write_queue;

pub use framer::LineFramer;
pub use interface::{list_ports, NativeOpener, PortOpener, SerialInterface, SerialPortIO};
pub use write_queue::WriteQueue;

use serde::{Deserialize, Serialize};

/// Baud rates offered as suggestions; any positive rate is accepted.
pub const RECOMMENDED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];
pub const DEFAULT_BAUD_RATE: u32 = 115200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

/// A discoverable serial device. `port_name` is the identity; the rest is
/// descriptive and only present for USB adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub port_name: String,
    pub kind: PortKind,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl PortDescriptor {
    pub fn named(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            kind: PortKind::Unknown,
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub port: String,
    pub baud: u32,
}

impl ConnectionConfig {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self { port: port.into(), baud }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(u32),

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

impl SerialError {
    /// True when the device vanished mid-session, as opposed to a failed open
    /// or a call on a closed channel.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SerialError::Disconnected(_))
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
