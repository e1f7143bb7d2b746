//! Collaboration engine for Promptsmith
//!
//! This crate wires the core domain, prompt assembly and storage into the
//! [`Orchestrator`], and provides the HTTP text generator, the session event
//! notifier and layered configuration used by the `promptsmith` binary.

use clap::ValueEnum;

pub mod config;
pub mod error;
pub mod llm;
pub mod notifier;
pub mod orchestrator;

pub use error::{Error, Result};
pub use llm::HttpTextGenerator;
pub use notifier::{Notifier, SessionEvent};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SessionSnapshot, TurnMatch};

/// Re-export the workspace crates for convenience
pub use promptsmith_core as core;
pub use promptsmith_prompts as prompts;
pub use promptsmith_storage as storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Plain,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Plain => "plain",
            LogFormat::Json => "json",
        }
    }
}
