//! Repository implementations for sessions and their ledgers

pub mod session;
pub mod turn;

pub use session::{SessionRepository, StoredSession};
pub use turn::TurnRepository;
