use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::LogError;

pub const DEFAULT_LOG_LABEL: &str = "project_name";

/// `<label>_<YYYYMMDD_HHMMSS>.log`, with a default label when blank.
pub fn log_file_name(label: &str, now: DateTime<Local>) -> String {
    let label = label.trim();
    let label = if label.is_empty() { DEFAULT_LOG_LABEL } else { label };
    format!("{}_{}.log", label, now.format("%Y%m%d_%H%M%S"))
}

/// A log file for one logging session. Each batch is flushed to disk.
pub struct LogFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogFile {
    pub fn create(dir: &Path, label: &str) -> Result<Self, LogError> {
        if !dir.is_dir() {
            return Err(LogError::DirectoryMissing(dir.to_path_buf()));
        }
        let path = dir.join(log_file_name(label, Local::now()));
        let file = File::create(&path)?;
        log::info!("Logging to {}", path.display());
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> io::Result<()> {
        for line in lines {
            writeln!(self.writer, "{}", line)?;
        }
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let now = Local.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
        assert_eq!(log_file_name("board_a", now), "board_a_20241231_235958.log");
        assert_eq!(log_file_name("  ", now), "project_name_20241231_235958.log");
        assert_eq!(log_file_name("", now), format!("{}_20241231_235958.log", DEFAULT_LOG_LABEL));
    }

    #[test]
    fn test_missing_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(LogFile::create(&missing, "x"), Err(LogError::DirectoryMissing(_))));
    }

    #[test]
    fn test_lines_flushed_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = LogFile::create(dir.path(), "run").unwrap();
        file.write_lines(["first", "second"]).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(written, "first\nsecond\n");
        assert!(file.path().file_name().unwrap().to_string_lossy().starts_with("run_"));
    }
}
