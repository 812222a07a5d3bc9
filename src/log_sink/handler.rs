use std::collections::VecDeque;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::session::SessionEvent;

use super::{format_event, LogError, LogFile, LogSink};

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

const HIGHLIGHT_START: &str = "\x1b[34m";
const HIGHLIGHT_END: &str = "\x1b[0m";

/// Byte ranges of every non-overlapping occurrence of `pattern` in `line`.
pub fn find_matches(line: &str, pattern: &str) -> Vec<Range<usize>> {
    if pattern.is_empty() {
        return Vec::new();
    }
    line.match_indices(pattern).map(|(start, m)| start..start + m.len()).collect()
}

fn render_highlighted(line: &str, pattern: Option<&str>) -> String {
    let Some(pattern) = pattern else {
        return line.to_string();
    };
    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    for range in find_matches(line, pattern) {
        out.push_str(&line[cursor..range.start]);
        out.push_str(HIGHLIGHT_START);
        out.push_str(&line[range.clone()]);
        out.push_str(HIGHLIGHT_END);
        cursor = range.end;
    }
    out.push_str(&line[cursor..]);
    out
}

/// The default log sink: bounded display history, optional echo to a
/// terminal, optional log file.
///
/// File errors stop file logging but never the session.
pub struct LogHandler {
    history: VecDeque<String>,
    capacity: usize,
    log_file: Option<LogFile>,
    highlight: Option<String>,
    echo: Option<Box<dyn Write + Send>>,
}

impl LogHandler {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            capacity: capacity.max(1),
            log_file: None,
            highlight: None,
            echo: None,
        }
    }

    /// Also print each formatted line to `out`, with highlight colouring.
    pub fn with_echo(mut self, out: Box<dyn Write + Send>) -> Self {
        self.echo = Some(out);
        self
    }

    /// Open a new log file in `dir`. Any current file is closed first.
    pub fn start_logging(&mut self, dir: &Path, label: &str) -> Result<PathBuf, LogError> {
        self.stop_logging();
        let file = LogFile::create(dir, label)?;
        let path = file.path().to_path_buf();
        self.log_file = Some(file);
        Ok(path)
    }

    pub fn stop_logging(&mut self) {
        if let Some(file) = self.log_file.take() {
            log::info!("Stopped logging to {}", file.path().display());
        }
    }

    pub fn is_logging(&self) -> bool {
        self.log_file.is_some()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn set_highlight(&mut self, pattern: Option<String>) {
        self.highlight = pattern.filter(|p| !p.is_empty());
    }

    pub fn highlight(&self) -> Option<&str> {
        self.highlight.as_deref()
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// `(history index, match range)` for every highlighted match.
    pub fn highlighted_matches(&self) -> Vec<(usize, Range<usize>)> {
        let Some(pattern) = self.highlight.as_deref() else {
            return Vec::new();
        };
        self.history
            .iter()
            .enumerate()
            .flat_map(|(i, line)| find_matches(line, pattern).into_iter().map(move |r| (i, r)))
            .collect()
    }

    fn remember(&mut self, line: String) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(line);
    }
}

impl Default for LogHandler {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl LogSink for LogHandler {
    fn write_batch(&mut self, events: &[SessionEvent]) {
        let lines: Vec<String> = events.iter().map(format_event).collect();

        if let Some(file) = self.log_file.as_mut() {
            if let Err(e) = file.write_lines(lines.iter().map(String::as_str)) {
                log::error!("Writing {} failed, logging stopped: {}", file.path().display(), e);
                self.log_file = None;
            }
        }

        if let Some(out) = self.echo.as_mut() {
            let highlight = self.highlight.as_deref();
            let result = lines
                .iter()
                .try_for_each(|line| writeln!(out, "{}", render_highlighted(line, highlight)))
                .and_then(|_| out.flush());
            if let Err(e) = result {
                log::warn!("Echo output failed, disabling it: {}", e);
                self.echo = None;
            }
        }

        for line in lines {
            self.remember(line);
        }
    }
}
