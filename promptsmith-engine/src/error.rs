//! Error types for the engine

use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Core domain error: {0}")]
    Core(#[from] promptsmith_core::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] promptsmith_storage::Error),

    #[error("Prompt error: {0}")]
    Prompt(#[from] promptsmith_prompts::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// The wrapped domain error, if any
    pub fn as_core(&self) -> Option<&promptsmith_core::Error> {
        match self {
            Error::Core(inner) => Some(inner),
            Error::Storage(promptsmith_storage::Error::Core(inner)) => Some(inner),
            Error::Prompt(promptsmith_prompts::Error::Core(inner)) => Some(inner),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.as_core().map_or(false, |e| e.is_not_found())
    }
}

/// Convenience result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
