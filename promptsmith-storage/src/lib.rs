//! Persistence layer for Promptsmith
//!
//! This crate keeps live sessions in memory ([`SessionStore`]), caches the
//! agent contexts built from them ([`ContextCache`]) and snapshots sessions
//! with their ledgers to SQLite through [`StorageManager`].

pub mod cache;
pub mod error;
pub mod manager;
pub mod migrations;
pub mod persistence;
pub mod repositories;
pub mod store;

pub use cache::{CacheStats, ContextCache};
pub use error::{Error, Result};
pub use manager::{DatabaseConfig, DatabaseStats, StorageManager};
pub use persistence::SessionPersistence;
pub use store::{SessionRecord, SessionSlot, SessionStore};

/// Re-export core types for convenience
pub use promptsmith_core as core;
