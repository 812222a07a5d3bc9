pub mod settings;
pub mod setup_file;

pub use settings::SessionSettings;
pub use setup_file::{QuickCommands, SetupFile, SETUP_FILE_NAME};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed setup file: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
