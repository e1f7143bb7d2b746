//! Core domain models and collaboration logic for Promptsmith
//!
//! Promptsmith drives three role-playing agents (Product Manager, Technical
//! Developer, Team Lead) through a bounded review loop that converges on a
//! finalized prompt. This crate holds everything that does not touch I/O:
//!
//! - [`classifier`]: keyword-evidence decision classifier with forced convergence
//! - [`validation`] and [`quality`]: response checks, confidence and quality scores
//! - [`context`]: the per-invocation view handed to an agent
//! - [`ledger`]: append-only turn record with query, search and threading
//! - [`state_machine`]: transition and agent-selection functions
//! - [`extractor`]: final-artifact extraction
//! - [`generation`]: the text-generation trait and retry helper

pub mod agent;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ledger;
pub mod quality;
pub mod session;
pub mod state_machine;
pub mod text;
pub mod turn;
pub mod validation;

pub use error::{Error, Result};
