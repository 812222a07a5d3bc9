use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

use uartlog_lib::log_sink::LogHandler;
use uartlog_lib::serial::mock::{MockDevice, MockOpener};
use uartlog_lib::serial::ConnectionConfig;
use uartlog_lib::session::UartSessionBuilder;

#[tokio::test]
async fn test_session_lines_reach_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new();

    let mut handler = LogHandler::new(100);
    let path = handler.start_logging(dir.path(), "bench").unwrap();
    let log = Arc::new(Mutex::new(handler));

    let handle = UartSessionBuilder::new(Arc::new(MockOpener::new(device.clone()))).build(log.clone());
    handle.open(ConnectionConfig::new("mock0", 9600)).await.unwrap();
    handle.send("READ").unwrap();
    device.inject(b"value=1\n\nvalue=2\n");
    sleep(Duration::from_millis(100)).await;
    device.unplug();
    sleep(Duration::from_millis(100)).await;

    let log = handle.shutdown().await.unwrap();
    let written = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = written.lines().collect();

    assert!(path.file_name().unwrap().to_string_lossy().starts_with("bench_"));
    assert_eq!(lines.first(), Some(&"Connected to mock0 at 9600 baud"));
    assert!(lines.contains(&"Sent: READ"));
    assert!(lines.iter().any(|l| l.ends_with(" - value=1")));
    assert!(lines.iter().any(|l| l.ends_with(" - ")));
    assert_eq!(lines.last(), Some(&"Serial port disconnected."));

    let history_len = log.lock().unwrap().history_len();
    assert_eq!(history_len, lines.len());
}

#[tokio::test]
async fn test_logging_to_missing_directory_fails_without_stopping_session() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new();
    let mut handler = LogHandler::default();
    assert!(handler.start_logging(&dir.path().join("absent"), "x").is_err());
    assert!(!handler.is_logging());

    let handle = UartSessionBuilder::new(Arc::new(MockOpener::new(device.clone()))).build(handler);
    handle.open(ConnectionConfig::new("mock0", 9600)).await.unwrap();
    device.inject(b"still here\n");
    sleep(Duration::from_millis(50)).await;

    let handler = handle.shutdown().await.unwrap();
    assert!(handler.history().any(|l| l.ends_with(" - still here")));
}
