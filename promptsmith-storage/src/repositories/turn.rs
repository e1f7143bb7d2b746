//! Turn repository implementation

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use promptsmith_core::turn::Turn;
use sqlx::{FromRow, Pool, Sqlite, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct TurnRow {
    id: String,
    session_id: String,
    sequence: i64,
    role: Option<String>,
    content: String,
    category: String,
    confidence: f64,
    issues: String,
    parent_id: Option<String>,
    metadata: String,
    created_at: DateTime<Utc>,
    edited: bool,
    edited_at: Option<DateTime<Utc>>,
    edit_reason: Option<String>,
}

fn parse_id(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Corrupt(format!("{} {}: {}", column, value, e)))
}

impl TryFrom<TurnRow> for Turn {
    type Error = Error;

    fn try_from(row: TurnRow) -> Result<Self> {
        Ok(Turn {
            id: parse_id(&row.id, "turn id")?,
            session_id: parse_id(&row.session_id, "session id")?,
            sequence: u64::try_from(row.sequence)
                .map_err(|_| Error::Corrupt(format!("negative sequence {}", row.sequence)))?,
            role: row.role.as_deref().map(str::parse).transpose()?,
            content: row.content,
            category: row.category.parse()?,
            confidence: row.confidence,
            issues: serde_json::from_str(&row.issues)?,
            parent_id: row
                .parent_id
                .as_deref()
                .map(|id| parse_id(id, "parent id"))
                .transpose()?,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: row.created_at,
            edited: row.edited,
            edited_at: row.edited_at,
            edit_reason: row.edit_reason,
        })
    }
}

/// Repository for ledger turns
pub struct TurnRepository {
    pool: Pool<Sqlite>,
}

impl TurnRepository {
    /// Create a new turn repository
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Replace the stored turns of a session inside an open transaction
    pub async fn replace_all(
        conn: &mut SqliteConnection,
        session_id: Uuid,
        turns: &[Turn],
    ) -> Result<()> {
        debug!("Writing {} turn(s) for session {}", turns.len(), session_id);

        sqlx::query("DELETE FROM turns WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&mut *conn)
            .await?;

        for turn in turns {
            sqlx::query(
                r#"
                INSERT INTO turns (
                    id, session_id, sequence, role, content, category, confidence,
                    issues, parent_id, metadata, created_at, edited, edited_at, edit_reason
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            )
            .bind(turn.id.to_string())
            .bind(turn.session_id.to_string())
            .bind(turn.sequence as i64)
            .bind(turn.role.map(|r| r.as_str()))
            .bind(&turn.content)
            .bind(turn.category.as_str())
            .bind(turn.confidence)
            .bind(serde_json::to_string(&turn.issues)?)
            .bind(turn.parent_id.map(|id| id.to_string()))
            .bind(serde_json::to_string(&turn.metadata)?)
            .bind(turn.created_at)
            .bind(turn.edited)
            .bind(turn.edited_at)
            .bind(&turn.edit_reason)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// List the turns of a session in sequence order
    pub async fn list_by_session(&self, session_id: Uuid) -> Result<Vec<Turn>> {
        debug!("Listing turns for session: {}", session_id);

        let rows = sqlx::query_as::<_, TurnRow>(
            r#"
            SELECT id, session_id, sequence, role, content, category, confidence,
                   issues, parent_id, metadata, created_at, edited, edited_at, edit_reason
            FROM turns
            WHERE session_id = ?1
            ORDER BY sequence ASC
        "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Turn::try_from).collect()
    }

    /// Count the turns of a session
    pub async fn count_by_session(&self, session_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns WHERE session_id = ?1")
            .bind(session_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Count all stored turns
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
