//! Session repository implementation

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use promptsmith_core::session::Session;
use sqlx::{FromRow, Pool, Sqlite, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    requirements: String,
    state: String,
    current_iteration: i64,
    max_iterations: i64,
    user_intervention_count: i64,
    max_interventions: i64,
    final_artifact: Option<String>,
    per_agent_outputs: String,
    supplementary_inputs: String,
    awaiting_user_input: bool,
    cancelled: bool,
    last_error: Option<String>,
    revision: i64,
    next_sequence: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A session as persisted, with the ledger's next sequence number
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub session: Session,
    pub next_sequence: u64,
}

impl TryFrom<SessionRow> for StoredSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::Corrupt(format!("session id {}: {}", row.id, e)))?;
        let next_sequence = row.next_sequence.max(1) as u64;
        let session = Session {
            id,
            requirements: row.requirements,
            current_iteration: to_u32(row.current_iteration, "current_iteration")?,
            max_iterations: to_u32(row.max_iterations, "max_iterations")?,
            user_intervention_count: to_u32(row.user_intervention_count, "user_intervention_count")?,
            max_interventions: to_u32(row.max_interventions, "max_interventions")?,
            state: row.state.parse()?,
            final_artifact: row.final_artifact,
            per_agent_outputs: serde_json::from_str(&row.per_agent_outputs)?,
            supplementary_inputs: serde_json::from_str(&row.supplementary_inputs)?,
            awaiting_user_input: row.awaiting_user_input,
            cancelled: row.cancelled,
            last_error: row.last_error,
            revision: row.revision as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        session.validate_invariants()?;
        Ok(StoredSession {
            session,
            next_sequence,
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Corrupt(format!("{} out of range: {}", column, value)))
}

const SELECT_SESSION: &str = r#"
    SELECT id, requirements, state, current_iteration, max_iterations,
           user_intervention_count, max_interventions, final_artifact,
           per_agent_outputs, supplementary_inputs, awaiting_user_input,
           cancelled, last_error, revision, next_sequence, created_at, updated_at
    FROM sessions
"#;

/// Repository for session records
pub struct SessionRepository {
    pool: Pool<Sqlite>,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert or update a session inside an open transaction
    pub async fn upsert(
        conn: &mut SqliteConnection,
        session: &Session,
        next_sequence: u64,
    ) -> Result<()> {
        debug!(
            "Saving session {} (state {}, revision {})",
            session.id, session.state, session.revision
        );

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, requirements, state, current_iteration, max_iterations,
                user_intervention_count, max_interventions, final_artifact,
                per_agent_outputs, supplementary_inputs, awaiting_user_input,
                cancelled, last_error, revision, next_sequence, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                current_iteration = excluded.current_iteration,
                user_intervention_count = excluded.user_intervention_count,
                final_artifact = excluded.final_artifact,
                per_agent_outputs = excluded.per_agent_outputs,
                supplementary_inputs = excluded.supplementary_inputs,
                awaiting_user_input = excluded.awaiting_user_input,
                cancelled = excluded.cancelled,
                last_error = excluded.last_error,
                revision = excluded.revision,
                next_sequence = excluded.next_sequence,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(session.id.to_string())
        .bind(&session.requirements)
        .bind(session.state.as_str())
        .bind(session.current_iteration as i64)
        .bind(session.max_iterations as i64)
        .bind(session.user_intervention_count as i64)
        .bind(session.max_interventions as i64)
        .bind(&session.final_artifact)
        .bind(serde_json::to_string(&session.per_agent_outputs)?)
        .bind(serde_json::to_string(&session.supplementary_inputs)?)
        .bind(session.awaiting_user_input)
        .bind(session.cancelled)
        .bind(&session.last_error)
        .bind(session.revision as i64)
        .bind(next_sequence as i64)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Find session by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredSession>> {
        debug!("Finding session by ID: {}", id);

        let row = sqlx::query_as::<_, SessionRow>(&format!("{} WHERE id = ?1", SELECT_SESSION))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(StoredSession::try_from).transpose()
    }

    /// List all sessions, newest first
    pub async fn list(&self) -> Result<Vec<Session>> {
        debug!("Listing all sessions");

        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "{} ORDER BY created_at DESC",
            SELECT_SESSION
        ))
        .fetch_all(&self.pool)
        .await?;

        let sessions = rows
            .into_iter()
            .map(|row| StoredSession::try_from(row).map(|stored| stored.session))
            .collect::<Result<Vec<_>>>()?;
        debug!("Found {} sessions", sessions.len());
        Ok(sessions)
    }

    /// Delete a session and, through the foreign key, its turns
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        debug!("Deleting session: {}", id);

        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Session", id));
        }

        info!("Successfully deleted session: {}", id);
        Ok(())
    }

    /// Count all sessions
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
