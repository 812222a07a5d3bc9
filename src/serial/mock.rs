//! In-memory serial device used by unit and integration tests.
//!
//! A `MockDevice` is a cloneable handle to shared state: the test side injects
//! inbound chunks and inspects what was written, while the session side sees a
//! regular `SerialPortIO` transport.
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::interface::{PortOpener, SerialPortIO};
use super::{ConnectionConfig, Result, SerialError};

#[derive(Debug, Default)]
struct DeviceState {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    unplugged: bool,
    writes_left: Option<usize>,
    opens: usize,
    last_config: Option<ConnectionConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue bytes for the session to read. Each call is delivered as one chunk.
    pub fn inject(&self, bytes: &[u8]) {
        self.state().inbound.push_back(bytes.to_vec());
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Every subsequent read or write fails as if the cable was pulled.
    pub fn unplug(&self) {
        self.state().unplugged = true;
    }

    pub fn replug(&self) {
        let mut state = self.state();
        state.unplugged = false;
        state.writes_left = None;
    }

    /// Let `n` more writes through, then fail the rest.
    pub fn fail_writes_after(&self, n: usize) {
        self.state().writes_left = Some(n);
    }

    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    pub fn last_config(&self) -> Option<ConnectionConfig> {
        self.state().last_config.clone()
    }
}

struct MockPort {
    device: MockDevice,
}

#[async_trait]
impl SerialPortIO for MockPort {
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.device.state();
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        let Some(mut chunk) = state.inbound.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut guard = self.device.state();
        let state = &mut *guard;
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if let Some(left) = state.writes_left.as_mut() {
            if *left == 0 {
                state.unplugged = true;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            *left -= 1;
        }
        state.written.extend_from_slice(data);
        Ok(())
    }
}

/// Hands out transports bound to one `MockDevice`, or always fails.
pub struct MockOpener {
    device: Option<MockDevice>,
    failure: Option<String>,
}

impl MockOpener {
    pub fn new(device: MockDevice) -> Self {
        Self { device: Some(device), failure: None }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { device: None, failure: Some(message.into()) }
    }
}

impl PortOpener for MockOpener {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialPortIO>> {
        if let Some(message) = &self.failure {
            return Err(SerialError::ConnectionFailed(message.clone()));
        }
        let device = self
            .device
            .clone()
            .ok_or_else(|| SerialError::PortNotFound(config.port.clone()))?;

        {
            let mut state = device.state();
            if state.unplugged {
                return Err(SerialError::PortNotFound(config.port.clone()));
            }
            state.opens += 1;
            state.last_config = Some(config.clone());
        }
        Ok(Box::new(MockPort { device }))
    }
}
