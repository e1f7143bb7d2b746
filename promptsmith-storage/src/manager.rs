//! Storage manager for coordinating database operations

use crate::migrations::Migrations;
use crate::persistence::SessionPersistence;
use crate::{repositories::*, Error, Result};
use async_trait::async_trait;
use promptsmith_core::ledger::{ConversationLedger, LedgerExport};
use promptsmith_core::session::Session;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub migrate_on_startup: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./promptsmith.db".to_string(),
            max_connections: Some(5),
            migrate_on_startup: true,
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, used by tests and one-shot runs
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
            migrate_on_startup: true,
        }
    }
}

/// Main storage manager coordinating the repositories
pub struct StorageManager {
    pool: Pool<Sqlite>,
    sessions: Arc<SessionRepository>,
    turns: Arc<TurnRepository>,
}

impl StorageManager {
    /// Create a new storage manager
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(5))
            .connect_with(options)
            .await?;

        info!("Database connection established");

        let manager = Self::from_pool(pool);
        if config.migrate_on_startup {
            manager.migrate().await?;
        }
        Ok(manager)
    }

    /// Wrap an existing pool; migrations are the caller's business
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        let sessions = Arc::new(SessionRepository::new(pool.clone()));
        let turns = Arc::new(TurnRepository::new(pool.clone()));
        Self {
            pool,
            sessions,
            turns,
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        Migrations::run(&self.pool).await
    }

    /// Get session repository
    pub fn sessions(&self) -> Arc<SessionRepository> {
        self.sessions.clone()
    }

    /// Get turn repository
    pub fn turns(&self) -> Arc<TurnRepository> {
        self.turns.clone()
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get database statistics
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let sessions_count = self.sessions.count().await?;
        let turns_count = self.turns.count().await?;

        Ok(DatabaseStats {
            sessions_count,
            turns_count,
        })
    }
}

#[async_trait]
impl SessionPersistence for StorageManager {
    async fn save(&self, session: &Session, ledger: &ConversationLedger) -> Result<()> {
        if ledger.session_id() != session.id {
            return Err(Error::Corrupt(format!(
                "ledger of session {} saved under session {}",
                ledger.session_id(),
                session.id
            )));
        }

        let export = ledger.export();
        let mut tx = self.pool.begin().await?;
        SessionRepository::upsert(&mut *tx, session, export.next_sequence).await?;
        TurnRepository::replace_all(&mut *tx, session.id, &export.turns).await?;
        tx.commit().await?;

        debug!(
            "Persisted session {} with {} turn(s)",
            session.id,
            export.turns.len()
        );
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<(Session, ConversationLedger)>> {
        let Some(stored) = self.sessions.find_by_id(id).await? else {
            return Ok(None);
        };
        let turns = self.turns.list_by_session(id).await?;
        let ledger = ConversationLedger::import(LedgerExport {
            session_id: id,
            next_sequence: stored.next_sequence,
            turns,
        })?;
        stored.session.validate_outputs(&ledger)?;
        Ok(Some((stored.session, ledger)))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.sessions.delete(id).await
    }

    async fn list(&self) -> Result<Vec<Session>> {
        self.sessions.list().await
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub sessions_count: i64,
    pub turns_count: i64,
}
