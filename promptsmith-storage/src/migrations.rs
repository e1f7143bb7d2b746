//! Database migration utilities

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Migration utilities and helpers
pub struct Migrations;

impl Migrations {
    /// Apply all embedded migrations
    pub async fn run(pool: &SqlitePool) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Highest applied migration version, `None` on a fresh database
    pub async fn current_version(pool: &SqlitePool) -> Result<Option<i64>> {
        let table: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
        )
        .fetch_optional(pool)
        .await?;
        if table.is_none() {
            return Ok(None);
        }

        let version: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(pool)
                .await?;
        Ok(version.0)
    }

    /// Check if migrations are needed
    pub async fn needs_migration(pool: &SqlitePool) -> Result<bool> {
        let latest = sqlx::migrate!("./migrations")
            .iter()
            .map(|m| m.version)
            .max();
        let current = Self::current_version(pool).await?;
        Ok(match (current, latest) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(current), Some(latest)) => current < latest,
        })
    }
}
