//! Agent prompts for Promptsmith
//!
//! This crate holds the role system prompts and per-mode task templates,
//! renders them against an agent context and assembles the resulting
//! generation request.

pub mod error;
pub mod manager;
pub mod renderer;
pub mod templates;

pub use error::{Error, Result};
pub use manager::PromptManager;
pub use renderer::PromptRenderer;

/// Re-export core types for convenience
pub use promptsmith_core as core;
