use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] repairsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Settings file already exists at {0}. Pass --force to overwrite it.")]
    SettingsExist(PathBuf),
    #[error("Failed to read fixture {path}: {reason}")]
    InvalidFixture { path: PathBuf, reason: String },
}
