//! Session runtime: three tasks wired together with channels.
//!
//! The driver task owns the `UartSession` and therefore the port. The writer
//! task turns dispatch requests and repeat ticks into writes and asks the
//! driver to perform them. The presentation task batches events into a
//! `LogSink`. Nothing else touches the device.
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::select;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, MissedTickBehavior};

use crate::config::SessionSettings;
use crate::log_sink::LogSink;
use crate::serial::{ConnectionConfig, NativeOpener, PortOpener, SerialError, SerialInterface, WriteQueue};

use super::engine::{ReadOutcome, UartSession};
use super::repeat::{RepeatState, RepeatStatus};
use super::{ConnectionState, SessionError, SessionEvent};

const CONTROL_CAPACITY: usize = 64;

pub(crate) enum SessionCommand {
    Open {
        config: ConnectionConfig,
        responder: oneshot::Sender<Result<(), SerialError>>,
    },
    Close {
        responder: oneshot::Sender<()>,
    },
    /// Replies with the id of the connection the text went out on. With
    /// `connection` set, the write is refused unless that connection is
    /// still the open one.
    Write {
        text: String,
        connection: Option<u64>,
        responder: oneshot::Sender<Result<u64, SerialError>>,
    },
    Shutdown,
}

/// Work for the writer task, processed in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchRequest {
    Send(String),
    StartRepeat { command: String, interval: Duration },
    StopRepeat,
}

pub struct UartSessionBuilder {
    opener: Arc<dyn PortOpener>,
    settings: SessionSettings,
}

impl UartSessionBuilder {
    pub fn new(opener: Arc<dyn PortOpener>) -> Self {
        Self { opener, settings: SessionSettings::default() }
    }

    pub fn native() -> Self {
        Self::new(Arc::new(NativeOpener::default()))
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Spawn the session tasks. Must be called from within a tokio runtime.
    pub fn build<S: LogSink + 'static>(self, sink: S) -> UartSessionHandle<S> {
        let settings = self.settings;
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (repeat_tx, repeat_rx) = watch::channel(RepeatStatus::default());

        let session = UartSession::new(
            SerialInterface::new(self.opener),
            WriteQueue::new(settings.write_queue_capacity),
            events_tx.clone(),
        )
        .with_read_chunk_size(settings.read_chunk_size);
        log::info!("Starting session {}", session.id());

        let driver = tokio::spawn(driver_task(
            session,
            control_rx,
            state_tx,
            settings.idle_backoff(),
            settings.disconnected_backoff(),
        ));
        let writer = tokio::spawn(writer_task(
            dispatch_rx,
            control_tx.clone(),
            events_tx,
            state_rx.clone(),
            repeat_tx,
            settings.writer_wait(),
        ));
        let presenter = tokio::spawn(presentation_task(
            sink,
            events_rx,
            settings.batch_size.max(1),
            settings.batch_interval(),
        ));

        UartSessionHandle { control_tx, dispatch_tx, state_rx, repeat_rx, driver, writer, presenter }
    }
}

/// Front end of a running session.
pub struct UartSessionHandle<S> {
    control_tx: mpsc::Sender<SessionCommand>,
    dispatch_tx: mpsc::UnboundedSender<DispatchRequest>,
    state_rx: watch::Receiver<ConnectionState>,
    repeat_rx: watch::Receiver<RepeatStatus>,
    driver: JoinHandle<()>,
    writer: JoinHandle<()>,
    presenter: JoinHandle<S>,
}

impl<S> UartSessionHandle<S> {
    /// Open the port. The published state is updated before this returns.
    pub async fn open(&self, config: ConnectionConfig) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(SessionCommand::Open { config, responder: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?.map_err(SessionError::from)
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(SessionCommand::Close { responder: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Queue a command for sending. The outcome shows up as a `Sent` or
    /// `SendFailed` event.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.dispatch(DispatchRequest::Send(text.into()))
    }

    pub fn start_repeat(&self, command: impl Into<String>, interval: Duration) -> Result<(), SessionError> {
        self.dispatch(DispatchRequest::StartRepeat { command: command.into(), interval })
    }

    pub fn stop_repeat(&self) -> Result<(), SessionError> {
        self.dispatch(DispatchRequest::StopRepeat)
    }

    fn dispatch(&self, request: DispatchRequest) -> Result<(), SessionError> {
        self.dispatch_tx.send(request).map_err(|_| SessionError::ChannelClosed)
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn repeat_receiver(&self) -> watch::Receiver<RepeatStatus> {
        self.repeat_rx.clone()
    }

    /// Stop all tasks, closing the port if open, and hand back the sink once
    /// every queued event has been delivered to it.
    pub async fn shutdown(self) -> Result<S, SessionError> {
        let UartSessionHandle { control_tx, dispatch_tx, driver, writer, presenter, .. } = self;
        let _ = control_tx.send(SessionCommand::Shutdown).await;
        drop(control_tx);
        drop(dispatch_tx);

        driver.await.map_err(|e| SessionError::TaskFailed(e.to_string()))?;
        writer.await.map_err(|e| SessionError::TaskFailed(e.to_string()))?;
        presenter.await.map_err(|e| SessionError::TaskFailed(e.to_string()))
    }
}

fn publish_state(session: &UartSession, state_tx: &watch::Sender<ConnectionState>) {
    let state = match session.config() {
        Some(config) if session.is_connected() => ConnectionState::Connected(config.clone()),
        _ => ConnectionState::Disconnected,
    };
    state_tx.send_if_modified(|current| {
        if *current == state {
            return false;
        }
        *current = state;
        true
    });
}

async fn handle_command(
    session: &mut UartSession,
    command: SessionCommand,
    state_tx: &watch::Sender<ConnectionState>,
) -> ControlFlow<()> {
    match command {
        SessionCommand::Open { config, responder } => {
            let result = session.open(&config);
            publish_state(session, state_tx);
            let _ = responder.send(result);
        }
        SessionCommand::Close { responder } => {
            session.close();
            publish_state(session, state_tx);
            let _ = responder.send(());
        }
        SessionCommand::Write { text, connection, responder } => {
            let result = match connection {
                Some(expected) if expected != session.connection_id() => {
                    Err(SerialError::Disconnected(format!("connection {} ended", expected)))
                }
                _ => session.send(&text).await.map(|()| session.connection_id()),
            };
            publish_state(session, state_tx);
            let _ = responder.send(result);
        }
        SessionCommand::Shutdown => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

/// Reader side. Control messages always go first so a burst of inbound data
/// cannot starve writes; reads never run inside `select!`, so a cancelled
/// branch cannot lose bytes.
pub(crate) async fn driver_task(
    mut session: UartSession,
    mut control_rx: mpsc::Receiver<SessionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    idle_backoff: Duration,
    disconnected_backoff: Duration,
) {
    'outer: loop {
        loop {
            match control_rx.try_recv() {
                Ok(command) => {
                    if handle_command(&mut session, command, &state_tx).await.is_break() {
                        break 'outer;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        let outcome = session.read_step().await;
        publish_state(&session, &state_tx);
        let backoff = match outcome {
            ReadOutcome::Data(_) => {
                tokio::task::yield_now().await;
                continue;
            }
            ReadOutcome::Idle if idle_backoff.is_zero() => {
                tokio::task::yield_now().await;
                continue;
            }
            ReadOutcome::Idle => idle_backoff,
            ReadOutcome::Closed | ReadOutcome::Disconnected => disconnected_backoff,
        };

        select! {
            maybe_cmd = control_rx.recv() => match maybe_cmd {
                Some(command) => {
                    if handle_command(&mut session, command, &state_tx).await.is_break() {
                        break;
                    }
                }
                None => break,
            },
            _ = sleep(backoff) => {}
        }
    }

    session.close();
    publish_state(&session, &state_tx);
    log::info!("Session {} stopped", session.id());
}

async fn dispatch_one(
    control_tx: &mpsc::Sender<SessionCommand>,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    text: String,
    connection: Option<u64>,
) -> Result<u64, SessionError> {
    let (tx, rx) = oneshot::channel();
    control_tx
        .send(SessionCommand::Write { text: text.clone(), connection, responder: tx })
        .await
        .map_err(|_| SessionError::ChannelClosed)?;
    match rx.await.map_err(|_| SessionError::ChannelClosed)? {
        Ok(id) => {
            let _ = events_tx.send(SessionEvent::Sent { command: text });
            Ok(id)
        }
        Err(e) => {
            let _ = events_tx.send(SessionEvent::SendFailed { command: text, reason: e.to_string() });
            Err(e.into())
        }
    }
}

pub(crate) async fn writer_task(
    mut dispatch_rx: mpsc::UnboundedReceiver<DispatchRequest>,
    control_tx: mpsc::Sender<SessionCommand>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    repeat_tx: watch::Sender<RepeatStatus>,
    writer_wait: Duration,
) {
    let mut repeat = RepeatState::new();

    loop {
        if repeat.is_active() && !state_rx.borrow().is_connected() {
            log::info!("Connection gone, repeat stopped after {} sends", repeat.count());
            repeat.stop();
            let _ = repeat_tx.send(repeat.status());
        }

        let wait = repeat
            .time_until_due(Instant::now())
            .map_or(writer_wait, |due| due.min(writer_wait));

        match timeout(wait, dispatch_rx.recv()).await {
            Ok(Some(DispatchRequest::Send(text))) => {
                if let Err(SessionError::ChannelClosed) = dispatch_one(&control_tx, &events_tx, text, None).await {
                    break;
                }
            }
            Ok(Some(DispatchRequest::StartRepeat { command, interval })) => {
                log::info!("Repeating {:?} every {:?}", command, interval);
                repeat.start(command, interval, Instant::now());
                let _ = repeat_tx.send(repeat.status());
            }
            Ok(Some(DispatchRequest::StopRepeat)) => {
                repeat.stop();
                let _ = repeat_tx.send(repeat.status());
            }
            Ok(None) => break,
            Err(_) => {}
        }

        if let Some(command) = repeat.take_due(Instant::now()) {
            // Later sends are pinned to the connection of the first one, so a
            // reconnect in between ends the repeat.
            match dispatch_one(&control_tx, &events_tx, command, repeat.connection()).await {
                Ok(connection) => repeat.record_send(connection),
                Err(SessionError::ChannelClosed) => break,
                Err(e) if e.is_disconnect() => {
                    log::info!("Connection lost, repeat stopped after {} sends", repeat.count());
                    repeat.stop();
                }
                Err(e) => {
                    log::warn!("Repeat stopped: {}", e);
                    repeat.stop();
                }
            }
            let _ = repeat_tx.send(repeat.status());
        }
    }

    if repeat.is_active() {
        repeat.stop();
        let _ = repeat_tx.send(repeat.status());
    }
}

/// Deliver events to the sink at most `batch_size` per tick. Runs until every
/// sender is gone and the queue is empty, then returns the sink.
pub(crate) async fn presentation_task<S: LogSink>(
    mut sink: S,
    mut events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    batch_size: usize,
    batch_interval: Duration,
) -> S {
    let mut ticker = tokio::time::interval(batch_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        ticker.tick().await;
        let mut finished = false;
        while batch.len() < batch_size {
            match events_rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }
        if !batch.is_empty() {
            sink.write_batch(&batch);
            batch.clear();
        }
        if finished {
            break;
        }
    }
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::CollectingSink;

    #[tokio::test]
    async fn test_presentation_respects_batch_size() {
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..250 {
            tx.send(SessionEvent::Sent { command: i.to_string() }).unwrap();
        }
        drop(tx);

        let sink = presentation_task(CollectingSink::new(), rx, 100, Duration::from_millis(1)).await;
        let sizes: Vec<usize> = sink.batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(sink.events().next(), Some(&SessionEvent::Sent { command: "0".into() }));
    }

    #[tokio::test]
    async fn test_write_pinned_to_replaced_connection_is_refused() {
        use crate::serial::mock::{MockDevice, MockOpener};

        let device = MockDevice::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let channel = SerialInterface::new(Arc::new(MockOpener::new(device.clone())));
        let mut session = UartSession::new(channel, WriteQueue::default(), events_tx);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let config = ConnectionConfig::new("mock0", 9600);

        async fn write(
            session: &mut UartSession,
            state_tx: &watch::Sender<ConnectionState>,
            connection: Option<u64>,
        ) -> Result<u64, SerialError> {
            let (tx, rx) = oneshot::channel();
            let command = SessionCommand::Write { text: "PING".into(), connection, responder: tx };
            assert!(handle_command(session, command, state_tx).await.is_continue());
            rx.await.unwrap()
        }

        session.open(&config).unwrap();
        let first = write(&mut session, &state_tx, None).await.unwrap();
        assert_eq!(first, 1);

        device.unplug();
        session.read_step().await;
        device.replug();
        session.open(&config).unwrap();
        publish_state(&session, &state_tx);
        assert!(state_rx.borrow().is_connected());

        let err = write(&mut session, &state_tx, Some(first)).await.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(device.written(), b"PING\n");
        assert_eq!(write(&mut session, &state_tx, Some(2)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_presentation_exits_when_senders_drop() {
        let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
        drop(tx);
        let sink = presentation_task(CollectingSink::new(), rx, 10, Duration::from_millis(1)).await;
        assert!(sink.batches.is_empty());
    }
}
