//! Error types for the core domain

use thiserror::Error;

/// Core error type for collaboration operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Text generation failed: {message}")]
    Generation { message: String, transient: bool },

    #[error("Response failed validation: {message}")]
    ValidationFailure { message: String },

    #[error("Budget exceeded: {budget} limit of {limit} reached")]
    BudgetExceeded { budget: String, limit: u32 },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Invalid transition: {message}")]
    InvalidTransition { message: String },

    #[error("Turn not found: {id}")]
    TurnNotFound { id: String },

    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl Error {
    /// Create a validation error with a formatted message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a transient generation error (eligible for retry)
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a permanent generation error
    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
            transient: false,
        }
    }

    pub fn validation_failure<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailure {
            message: message.into(),
        }
    }

    pub fn budget_exceeded<S: Into<String>>(budget: S, limit: u32) -> Self {
        Self::BudgetExceeded {
            budget: budget.into(),
            limit,
        }
    }

    pub fn session_not_found<S: ToString>(id: S) -> Self {
        Self::SessionNotFound { id: id.to_string() }
    }

    pub fn invalid_transition<S: Into<String>>(message: S) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    pub fn turn_not_found<S: ToString>(id: S) -> Self {
        Self::TurnNotFound { id: id.to_string() }
    }

    /// Create a constraint violation error
    pub fn constraint_violation<S1: Into<String>, S2: Into<String>>(
        constraint: S1,
        message: S2,
    ) -> Self {
        Self::ConstraintViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Check if this error is a missing-session error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::SessionNotFound { .. } | Error::TurnNotFound { .. })
    }

    /// Check if this error is recoverable (the generation call may be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Generation {
                transient: true,
                ..
            }
        )
    }

    /// Get the error category for logging and turn metadata
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Generation { .. } => "generation",
            Error::ValidationFailure { .. } => "validation_failure",
            Error::BudgetExceeded { .. } => "budget_exceeded",
            Error::SessionNotFound { .. } => "session_not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::TurnNotFound { .. } => "turn_not_found",
            Error::ConstraintViolation { .. } => "constraint_violation",
            Error::Serialization(_) => "serialization",
            Error::Configuration { .. } => "configuration",
            Error::Internal(_) => "internal",
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
