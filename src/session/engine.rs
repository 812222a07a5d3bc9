//! The UART session: one serial channel, one line framer and one write queue.
//!
//! All output goes through the event sender; nothing here blocks on a
//! consumer. The session is driven from a single task (see `runtime`), which
//! makes it the only owner of the device handle.
use chrono::Local;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::serial::{ConnectionConfig, LineFramer, SerialError, SerialInterface, WriteQueue};

use super::SessionEvent;

pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Result of a single read step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The channel is not open; nothing was read.
    Closed,
    /// Connected, but the device had nothing buffered.
    Idle,
    /// Bytes arrived and this many complete lines were emitted (possibly zero).
    Data(usize),
    /// The device went away during this read.
    Disconnected,
}

pub struct UartSession {
    id: Uuid,
    channel: SerialInterface,
    framer: LineFramer,
    write_queue: WriteQueue,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    read_buf: Vec<u8>,
    disconnect_reported: bool,
    connection_id: u64,
}

impl UartSession {
    pub fn new(
        channel: SerialInterface,
        write_queue: WriteQueue,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            framer: LineFramer::new(),
            write_queue,
            events_tx,
            read_buf: vec![0u8; DEFAULT_READ_CHUNK_SIZE],
            disconnect_reported: false,
            connection_id: 0,
        }
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_buf = vec![0u8; size.max(1)];
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.channel.config()
    }

    /// Incremented on every successful open, so a reopened port never shares
    /// an id with the connection it replaced. `0` before the first open.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn pending_writes(&self) -> usize {
        self.write_queue.len()
    }

    /// Bytes of the current unterminated line.
    pub fn partial_line(&self) -> &[u8] {
        self.framer.pending()
    }

    /// Connect the channel. A failure leaves the session closed and is also
    /// reported as a `ConnectFailed` event.
    pub fn open(&mut self, config: &ConnectionConfig) -> Result<(), SerialError> {
        match self.channel.connect(config) {
            Ok(()) => {
                self.framer.reset();
                self.disconnect_reported = false;
                self.connection_id += 1;
                log::info!("Session {} opened {} @ {}", self.id, config.port, config.baud);
                self.emit(SessionEvent::Connected { port: config.port.clone(), baud: config.baud });
                Ok(())
            }
            Err(e) => {
                log::warn!("Session {} failed to open {}: {}", self.id, config.port, e);
                self.emit(SessionEvent::ConnectFailed { message: e.to_string() });
                Err(e)
            }
        }
    }

    /// Close the channel. Pending writes are discarded, never flushed.
    pub fn close(&mut self) {
        let was_open = self.channel.is_connected();
        let discarded = self.write_queue.clear();
        if discarded > 0 {
            log::debug!("Session {} discarded {} pending writes on close", self.id, discarded);
        }
        self.channel.disconnect();
        self.framer.reset();
        if was_open {
            self.emit(SessionEvent::Closed);
        }
    }

    /// Pull whatever the device has buffered and emit the completed lines.
    pub async fn read_step(&mut self) -> ReadOutcome {
        if !self.channel.is_connected() {
            return ReadOutcome::Closed;
        }

        match self.channel.read_available(&mut self.read_buf).await {
            Ok(0) => ReadOutcome::Idle,
            Ok(n) => {
                let lines = self.framer.push(&self.read_buf[..n]);
                let count = lines.len();
                for text in lines {
                    self.emit(SessionEvent::Line { text, timestamp: Local::now() });
                }
                ReadOutcome::Data(count)
            }
            Err(e) if e.is_disconnect() => {
                self.connection_lost();
                ReadOutcome::Disconnected
            }
            Err(e) => {
                log::debug!("Session {} read skipped: {}", self.id, e);
                ReadOutcome::Closed
            }
        }
    }

    /// Queue `text` plus a newline, evicting the oldest entry when full.
    pub fn enqueue(&mut self, text: &str) {
        self.write_queue.enqueue_line(text);
    }

    /// Write queued entries in FIFO order. Returns how many went out.
    ///
    /// Stops at the first failure; on device loss the remaining entries are
    /// dropped along with the connection.
    pub async fn flush(&mut self) -> Result<usize, SerialError> {
        if !self.channel.is_connected() {
            return Err(SerialError::NotConnected);
        }

        let mut written = 0;
        while let Some(payload) = self.write_queue.pop() {
            if let Err(e) = self.channel.write(&payload).await {
                if e.is_disconnect() {
                    self.connection_lost();
                }
                return Err(e);
            }
            written += 1;
        }
        Ok(written)
    }

    /// Enqueue and flush one command. Fails with `NotConnected` when closed
    /// without touching the queue.
    pub async fn send(&mut self, text: &str) -> Result<(), SerialError> {
        if !self.channel.is_connected() {
            return Err(SerialError::NotConnected);
        }
        self.enqueue(text);
        self.flush().await.map(|_| ())
    }

    fn connection_lost(&mut self) {
        let discarded = self.write_queue.clear();
        if discarded > 0 {
            log::warn!("Session {} dropped {} unsent commands after disconnect", self.id, discarded);
        }
        self.framer.reset();
        if !self.disconnect_reported {
            self.disconnect_reported = true;
            self.emit(SessionEvent::Disconnected);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}
