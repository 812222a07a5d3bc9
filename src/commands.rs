//! Terminal input: plain text is sent to the device, `/`-prefixed lines are
//! front end commands. `//text` sends `/text` literally.
use std::time::Duration;

use crate::config::setup_file::QUICK_COMMAND_SLOTS;

pub const HELP: &str = "\
Commands:
  <text>                  send text to the device
  //text                  send text starting with '/'
  /repeat [secs] <text>   send text every secs seconds (default 1)
  /stop                   stop repeating
  /btn <1-10>             send a quick command from the setup file
  /buttons                list quick commands
  /connect                reconnect to the selected port
  /disconnect             close the port
  /log [label]            start a new log file
  /nolog                  stop logging to file
  /find [pattern]         highlight pattern, or clear the highlight
  /clear                  clear the history
  /ports                  list serial ports
  /help                   show this help
  /quit                   exit";

#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    Send(String),
    /// `interval` is `None` when the user gave none or an unusable one.
    Repeat { command: String, interval: Option<Duration> },
    StopRepeat,
    Quick(u8),
    ListQuick,
    Connect,
    Disconnect,
    StartLog(Option<String>),
    StopLog,
    Highlight(Option<String>),
    Clear,
    Ports,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Unknown command: /{0} (try /help)")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Quick command slot must be 1-{max}, got {0}", max = QUICK_COMMAND_SLOTS)]
    InvalidSlot(String),
}

/// Parse one line of user input. Blank input yields `Ok(None)`.
pub fn parse_input(line: &str) -> Result<Option<InputCommand>, InputError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(InputCommand::Send(line.to_string())));
    };
    if rest.starts_with('/') {
        return Ok(Some(InputCommand::Send(rest.to_string())));
    }

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let optional = |args: &str| (!args.is_empty()).then(|| args.to_string());

    let command = match name.to_ascii_lowercase().as_str() {
        "repeat" => parse_repeat(args)?,
        "stop" => InputCommand::StopRepeat,
        "btn" => InputCommand::Quick(parse_slot(args)?),
        "buttons" => InputCommand::ListQuick,
        "connect" => InputCommand::Connect,
        "disconnect" => InputCommand::Disconnect,
        "log" => InputCommand::StartLog(optional(args)),
        "nolog" => InputCommand::StopLog,
        "find" => InputCommand::Highlight(optional(args)),
        "clear" => InputCommand::Clear,
        "ports" => InputCommand::Ports,
        "help" | "?" => InputCommand::Help,
        "quit" | "exit" => InputCommand::Quit,
        _ => return Err(InputError::UnknownCommand(name.to_string())),
    };
    Ok(Some(command))
}

fn parse_repeat(args: &str) -> Result<InputCommand, InputError> {
    let (first, rest) = match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (args, ""),
    };

    let (interval, command) = match first.parse::<f64>() {
        Ok(secs) => (interval_from_secs(secs), rest),
        Err(_) => (None, args),
    };
    if command.is_empty() {
        return Err(InputError::MissingArgument("text to repeat"));
    }
    Ok(InputCommand::Repeat { command: command.to_string(), interval })
}

fn interval_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn parse_slot(args: &str) -> Result<u8, InputError> {
    if args.is_empty() {
        return Err(InputError::MissingArgument("quick command slot"));
    }
    match args.parse::<u8>() {
        Ok(slot) if (1..=QUICK_COMMAND_SLOTS).contains(&slot) => Ok(slot),
        _ => Err(InputError::InvalidSlot(args.to_string())),
    }
}
