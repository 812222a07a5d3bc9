use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use super::{ConnectionConfig, PortDescriptor, PortKind, Result, SerialError};

/// Per-call timeout handed to the native driver.
pub const NATIVE_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Raw byte transport behind an open connection.
///
/// Any error returned here is treated as loss of the device.
#[async_trait]
pub trait SerialPortIO: Send {
    /// Copy whatever is already buffered into `buf` without waiting for more.
    /// `Ok(0)` means nothing is pending.
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole payload and flush it to the device.
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens a transport for a connection config.
pub trait PortOpener: Send + Sync {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialPortIO>>;
}

/// Opens real serial ports through the `serialport` crate.
pub struct NativeOpener {
    read_timeout: Duration,
}

impl NativeOpener {
    pub fn new() -> Self {
        Self { read_timeout: NATIVE_READ_TIMEOUT }
    }
}

impl Default for NativeOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl PortOpener for NativeOpener {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialPortIO>> {
        let port = serialport::new(config.port.as_str(), config.baud)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                    SerialError::PortNotFound(format!("{}: {}", config.port, e))
                }
                _ => SerialError::ConnectionFailed(e.to_string()),
            })?;

        Ok(Box::new(NativePort { port }))
    }
}

struct NativePort {
    port: Box<dyn SerialPort>,
}

#[async_trait]
impl SerialPortIO for NativePort {
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(0);
        }

        let len = pending.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device reported pending bytes but returned end of stream",
            )),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }
}

/// List serial devices known to the OS.
///
/// Never fails: enumeration errors are logged and yield an empty list. Order
/// is whatever the platform reports.
pub fn list_ports() -> Vec<PortDescriptor> {
    match serialport::available_ports() {
        Ok(ports) => {
            let mut seen = HashSet::new();
            ports
                .into_iter()
                .filter(|p| seen.insert(p.port_name.clone()))
                .map(descriptor_from_info)
                .collect()
        }
        Err(e) => {
            log::warn!("Serial port enumeration failed: {}", e);
            Vec::new()
        }
    }
}

fn descriptor_from_info(info: SerialPortInfo) -> PortDescriptor {
    let mut descriptor = PortDescriptor::named(info.port_name);
    match info.port_type {
        SerialPortType::UsbPort(usb_info) => {
            descriptor.kind = PortKind::Usb;
            descriptor.vid = Some(usb_info.vid);
            descriptor.pid = Some(usb_info.pid);
            descriptor.serial_number = usb_info.serial_number;
            descriptor.manufacturer = usb_info.manufacturer;
            descriptor.product = usb_info.product;
        }
        SerialPortType::PciPort => descriptor.kind = PortKind::Pci,
        SerialPortType::BluetoothPort => descriptor.kind = PortKind::Bluetooth,
        SerialPortType::Unknown => descriptor.kind = PortKind::Unknown,
    }
    descriptor
}

/// The serial channel: either closed or holding one open transport.
///
/// Any I/O failure while open drops the transport, so callers must re-check
/// `is_connected()` after an error.
pub struct SerialInterface {
    opener: Arc<dyn PortOpener>,
    port: Option<Box<dyn SerialPortIO>>,
    config: Option<ConnectionConfig>,
}

impl SerialInterface {
    pub fn new(opener: Arc<dyn PortOpener>) -> Self {
        Self {
            opener,
            port: None,
            config: None,
        }
    }

    /// Open `config.port` at `config.baud`.
    pub fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        if let Some(current) = &self.config {
            return Err(SerialError::AlreadyConnected(current.port.clone()));
        }
        if config.baud == 0 {
            return Err(SerialError::InvalidBaudRate(config.baud));
        }

        let port = self.opener.open(config)?;
        self.port = Some(port);
        self.config = Some(config.clone());

        log::info!("Connected to {} at {} baud", config.port, config.baud);
        Ok(())
    }

    /// Close the connection. Safe to call when already closed.
    pub fn disconnect(&mut self) {
        if let Some(config) = self.config.take() {
            log::info!("Disconnecting from {}", config.port);
        }
        // Dropping the transport closes the OS handle; close errors are not observable.
        self.port = None;
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Read whatever is buffered. `Ok(0)` is "no data yet", not an error.
    pub async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        let result = port.read_available(buf).await;
        result.map_err(|e| self.connection_lost(e))
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        let result = port.write_all(data).await;
        result.map_err(|e| self.connection_lost(e))
    }

    fn connection_lost(&mut self, err: io::Error) -> SerialError {
        let port_name = self
            .config
            .as_ref()
            .map(|c| c.port.clone())
            .unwrap_or_default();
        log::warn!("Lost connection to {}: {}", port_name, err);
        self.port = None;
        self.config = None;
        SerialError::Disconnected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::{MockDevice, MockOpener};

    fn interface_for(device: &MockDevice) -> SerialInterface {
        SerialInterface::new(Arc::new(MockOpener::new(device.clone())))
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let device = MockDevice::new();
        let mut iface = interface_for(&device);
        iface.connect(&ConnectionConfig::new("mock0", 115200)).unwrap();
        assert!(iface.is_connected());

        iface.disconnect();
        iface.disconnect();
        assert!(!iface.is_connected());
        assert!(iface.config().is_none());
    }

    #[tokio::test]
    async fn test_zero_baud_rejected() {
        let device = MockDevice::new();
        let mut iface = interface_for(&device);
        let err = iface.connect(&ConnectionConfig::new("mock0", 0)).unwrap_err();
        assert!(matches!(err, SerialError::InvalidBaudRate(0)));
        assert!(!iface.is_connected());
    }

    #[tokio::test]
    async fn test_nonstandard_baud_passes_through() {
        let device = MockDevice::new();
        let mut iface = interface_for(&device);
        iface.connect(&ConnectionConfig::new("mock0", 250_000)).unwrap();
        assert_eq!(device.last_config().map(|c| c.baud), Some(250_000));
    }

    #[tokio::test]
    async fn test_second_connect_rejected_while_open() {
        let device = MockDevice::new();
        let mut iface = interface_for(&device);
        iface.connect(&ConnectionConfig::new("mock0", 9600)).unwrap();
        let err = iface.connect(&ConnectionConfig::new("mock1", 9600)).unwrap_err();
        assert!(matches!(err, SerialError::AlreadyConnected(ref p) if p == "mock0"));
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let mut iface = SerialInterface::new(Arc::new(MockOpener::failing("Access denied")));
        let err = iface.connect(&ConnectionConfig::new("mock0", 9600)).unwrap_err();
        assert!(matches!(err, SerialError::ConnectionFailed(ref m) if m == "Access denied"));
        assert!(!iface.is_connected());
    }

    #[tokio::test]
    async fn test_read_failure_closes_channel() {
        let device = MockDevice::new();
        let mut iface = interface_for(&device);
        iface.connect(&ConnectionConfig::new("mock0", 9600)).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(iface.read_available(&mut buf).await.unwrap(), 0);

        device.unplug();
        let err = iface.read_available(&mut buf).await.unwrap_err();
        assert!(err.is_disconnect());
        assert!(!iface.is_connected());

        let err = iface.read_available(&mut buf).await.unwrap_err();
        assert!(matches!(err, SerialError::NotConnected));
    }

    #[tokio::test]
    async fn test_write_failure_closes_channel() {
        let device = MockDevice::new();
        let mut iface = interface_for(&device);
        iface.connect(&ConnectionConfig::new("mock0", 9600)).unwrap();
        iface.write(b"ping\n").await.unwrap();
        assert_eq!(device.written(), b"ping\n");

        device.unplug();
        assert!(iface.write(b"ping\n").await.unwrap_err().is_disconnect());
        assert!(!iface.is_connected());
    }
}
