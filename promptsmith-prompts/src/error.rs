//! Error types for prompt assembly

use thiserror::Error;

/// Prompt assembly error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Core domain error: {0}")]
    Core(#[from] promptsmith_core::Error),

    #[error("Template variable missing: {name}")]
    MissingVariable { name: String },

    #[error("Invalid template syntax: {0}")]
    InvalidTemplate(String),
}

/// Convenience result type for prompt operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for promptsmith_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            other => promptsmith_core::Error::Internal(other.to_string()),
        }
    }
}
