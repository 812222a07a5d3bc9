use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use uartlog_lib::commands::{parse_input, InputCommand, HELP};
use uartlog_lib::config::{SessionSettings, SetupFile, SETUP_FILE_NAME};
use uartlog_lib::log_sink::LogHandler;
use uartlog_lib::serial::{list_ports, ConnectionConfig, DEFAULT_BAUD_RATE, RECOMMENDED_BAUD_RATES};
use uartlog_lib::session::UartSessionBuilder;

type SharedLog = Arc<Mutex<LogHandler>>;

/// uartlog: a line-oriented UART terminal and logger
#[derive(Parser, Debug)]
#[command(name = "uartlog", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    Ports {
        /// Print the port list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to a port, print incoming lines and send stdin as commands
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Serial port name (first listed port if omitted)
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE, value_parser = clap::value_parser!(u32).range(1..))]
    baud: u32,

    /// Start writing a log file immediately
    #[arg(long)]
    save: bool,

    /// Directory for log files; also stored in the setup file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log file label
    #[arg(long, default_value = "")]
    log_name: String,

    #[arg(long, default_value = SETUP_FILE_NAME)]
    setup: PathBuf,

    /// JSON file overriding session tunables
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Highlight this text in printed lines
    #[arg(long)]
    highlight: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    match cli.command {
        Command::Ports { json } => print_ports(json),
        Command::Monitor(args) => monitor(args).await,
    }
}

fn print_ports(json: bool) -> Result<()> {
    let ports = list_ports();
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in &ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => String::from("-"),
        };
        println!(
            "{:<24} {:<10} {:<10} {}",
            port.port_name,
            format!("{:?}", port.kind),
            ids,
            port.product.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn lock(log: &SharedLog) -> MutexGuard<'_, LogHandler> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn start_logging(log: &SharedLog, dir: &std::path::Path, label: &str) {
    match lock(log).start_logging(dir, label) {
        Ok(path) => println!("Logging to {}", path.display()),
        Err(e) => eprintln!("Cannot start logging: {}", e),
    }
}

async fn monitor(args: MonitorArgs) -> Result<()> {
    let settings = match &args.settings {
        Some(path) => SessionSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => SessionSettings::default(),
    };

    let cwd = std::env::current_dir().context("Failed to resolve the working directory")?;
    let setup = SetupFile::load_or_create(&args.setup, &cwd).unwrap_or_else(|e| {
        log::warn!("Setup file {} unusable, using defaults: {}", args.setup.display(), e);
        SetupFile::with_defaults(&cwd)
    });
    let log_dir = match &args.log_dir {
        Some(dir) => {
            if let Err(e) = SetupFile::update_log_dir(&args.setup, dir) {
                log::warn!("Could not store log directory in {}: {}", args.setup.display(), e);
            }
            dir.clone()
        }
        None => setup.log_dir.clone(),
    };

    let port = match args.port {
        Some(port) => port,
        None => list_ports()
            .into_iter()
            .next()
            .map(|p| p.port_name)
            .context("No serial ports found; pass --port")?,
    };
    if !RECOMMENDED_BAUD_RATES.contains(&args.baud) {
        log::info!("Using non-standard baud rate {}", args.baud);
    }
    let config = ConnectionConfig::new(port, args.baud);

    let mut handler = LogHandler::new(settings.history_capacity).with_echo(Box::new(io::stdout()));
    handler.set_highlight(args.highlight.clone());
    let log: SharedLog = Arc::new(Mutex::new(handler));
    if args.save {
        start_logging(&log, &log_dir, &args.log_name);
    }

    let handle = UartSessionBuilder::native().settings(settings.clone()).build(log.clone());
    if let Err(e) = handle.open(config.clone()).await {
        log::debug!("Initial open of {} failed: {}", config.port, e);
    }

    let mut state_rx = handle.state_receiver();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            if !state_rx.borrow_and_update().is_connected() {
                eprintln!("Port closed. Type /connect to reconnect.");
            }
        }
    });

    println!("Type text to send, /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match parse_input(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            InputCommand::Send(text) => handle.send(text)?,
            InputCommand::Repeat { command, interval } => {
                handle.start_repeat(command, interval.unwrap_or_else(|| settings.default_repeat_interval()))?
            }
            InputCommand::StopRepeat => handle.stop_repeat()?,
            InputCommand::Quick(slot) => match setup.quick_commands.command(slot) {
                Some(command) => handle.send(command)?,
                None => eprintln!("Quick command {} is not configured in {}", slot, args.setup.display()),
            },
            InputCommand::ListQuick => {
                for (slot, label) in setup.quick_commands.iter() {
                    println!("{:02}: {}", slot, label);
                }
            }
            InputCommand::Connect => {
                if handle.is_connected() {
                    println!("Already connected to {}", config.port);
                } else if let Err(e) = handle.open(config.clone()).await {
                    log::debug!("Reopen of {} failed: {}", config.port, e);
                }
            }
            InputCommand::Disconnect => handle.close().await?,
            InputCommand::StartLog(label) => {
                start_logging(&log, &log_dir, label.as_deref().unwrap_or(&args.log_name))
            }
            InputCommand::StopLog => lock(&log).stop_logging(),
            InputCommand::Highlight(pattern) => lock(&log).set_highlight(pattern),
            InputCommand::Clear => lock(&log).clear(),
            InputCommand::Ports => print_ports(false)?,
            InputCommand::Help => println!("{}", HELP),
            InputCommand::Quit => break,
        }
    }

    let log = handle.shutdown().await?;
    lock(&log).stop_logging();
    Ok(())
}
