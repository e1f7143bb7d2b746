//! Durable snapshot boundary used by the engine
//!
//! The engine saves a session together with its whole ledger after every
//! mutation. A failing save moves the session to `FAILED`; implementations
//! therefore report errors rather than swallowing them.

use crate::Result;
use async_trait::async_trait;
use promptsmith_core::ledger::ConversationLedger;
use promptsmith_core::session::Session;
use uuid::Uuid;

#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Write the session and its ledger atomically
    async fn save(&self, session: &Session, ledger: &ConversationLedger) -> Result<()>;

    /// Read a session and its ledger back
    async fn load(&self, id: Uuid) -> Result<Option<(Session, ConversationLedger)>>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Every stored session, newest first
    async fn list(&self) -> Result<Vec<Session>>;
}
