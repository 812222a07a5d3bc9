//! `setup.txt`: the log save directory on the first line, then up to ten
//! `NN:label` quick-command entries.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{ConfigError, Result};

pub const SETUP_FILE_NAME: &str = "setup.txt";
pub const QUICK_COMMAND_SLOTS: u8 = 10;

/// Quick-send slots keyed 1..=10. Slots still holding the `Button N`
/// placeholder have no command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickCommands {
    labels: BTreeMap<u8, String>,
}

impl QuickCommands {
    pub fn defaults() -> Self {
        Self {
            labels: (1..=QUICK_COMMAND_SLOTS).map(|slot| (slot, placeholder_label(slot))).collect(),
        }
    }

    pub fn set(&mut self, slot: u8, label: impl Into<String>) {
        self.labels.insert(slot, label.into());
    }

    /// Label shown for a slot, falling back to the placeholder.
    pub fn label(&self, slot: u8) -> String {
        self.labels.get(&slot).cloned().unwrap_or_else(|| placeholder_label(slot))
    }

    /// Command text for a slot, `None` if unset or still a placeholder.
    pub fn command(&self, slot: u8) -> Option<&str> {
        self.labels
            .get(&slot)
            .map(String::as_str)
            .filter(|label| !is_placeholder(label))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.labels.iter().map(|(slot, label)| (*slot, label.as_str()))
    }
}

fn placeholder_label(slot: u8) -> String {
    format!("Button {}", slot)
}

fn is_placeholder(label: &str) -> bool {
    label
        .strip_prefix("Button ")
        .map_or(false, |rest| !rest.is_empty() && !rest.contains(char::is_whitespace))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFile {
    pub log_dir: PathBuf,
    pub quick_commands: QuickCommands,
}

impl SetupFile {
    pub fn with_defaults(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            quick_commands: QuickCommands::defaults(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let log_dir = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ConfigError::Malformed("missing log directory line".to_string()))?;

        let mut quick_commands = QuickCommands::default();
        for line in lines {
            let Some((slot, label)) = line.trim().split_once(':') else {
                continue;
            };
            match slot.trim().parse::<u8>() {
                Ok(slot) => quick_commands.set(slot, label.trim()),
                Err(_) => log::debug!("Ignoring setup entry with bad slot: {:?}", line),
            }
        }

        Ok(Self { log_dir: PathBuf::from(log_dir), quick_commands })
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.log_dir.display());
        for (slot, label) in self.quick_commands.iter() {
            out.push_str(&format!("{:02}:{}\n", slot, label));
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Write a default setup file and return its contents.
    pub fn create_default(path: &Path, log_dir: &Path) -> Result<Self> {
        let setup = Self::with_defaults(log_dir);
        fs::write(path, setup.render())?;
        log::info!("Created default setup file at {}", path.display());
        Ok(setup)
    }

    pub fn load_or_create(path: &Path, default_log_dir: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::create_default(path, default_log_dir)
        }
    }

    /// Replace only the first line, leaving quick-command entries untouched.
    pub fn update_log_dir(path: &Path, log_dir: &Path) -> Result<()> {
        let new_first = log_dir.display().to_string();
        let text = fs::read_to_string(path)?;
        let mut lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            lines.push(&new_first);
        } else {
            lines[0] = &new_first;
        }

        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(path, out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entries() {
        let setup = SetupFile::parse("/var/log/uart\n01:RESET\n02:Button 2\n03: STATUS \nnoise\nxx:bad\n").unwrap();
        assert_eq!(setup.log_dir, PathBuf::from("/var/log/uart"));
        assert_eq!(setup.quick_commands.command(1), Some("RESET"));
        assert_eq!(setup.quick_commands.command(2), None);
        assert_eq!(setup.quick_commands.command(3), Some("STATUS"));
        assert_eq!(setup.quick_commands.command(4), None);
        assert_eq!(setup.quick_commands.label(4), "Button 4");
    }

    #[test]
    fn test_label_with_colon_kept_whole() {
        let setup = SetupFile::parse("logs\n05:AT+CFG=1:2\n").unwrap();
        assert_eq!(setup.quick_commands.command(5), Some("AT+CFG=1:2"));
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder("Button 7"));
        assert!(!is_placeholder("Button press now"));
        assert!(!is_placeholder("Button "));
        assert!(!is_placeholder("LED ON"));
    }

    #[test]
    fn test_empty_file_is_malformed() {
        assert!(matches!(SetupFile::parse(""), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETUP_FILE_NAME);

        let created = SetupFile::load_or_create(&path, dir.path()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(&format!("{}\n01:Button 1\n", dir.path().display())));
        assert!(text.ends_with("10:Button 10\n"));

        let loaded = SetupFile::load_or_create(&path, Path::new("/elsewhere")).unwrap();
        assert_eq!(loaded, created);
        assert!((1..=10).all(|slot| loaded.quick_commands.command(slot).is_none()));
    }

    #[test]
    fn test_update_log_dir_keeps_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETUP_FILE_NAME);
        fs::write(&path, "old\n01:PING\n02:Button 2\n").unwrap();

        SetupFile::update_log_dir(&path, Path::new("new/logs")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new/logs\n01:PING\n02:Button 2\n");
    }
}
