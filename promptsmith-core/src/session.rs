//! Session aggregate and its caller-facing summary
//!
//! A session is the aggregate root of one collaboration. It owns the budgets
//! (iterations and user interventions), the orchestration state and the
//! latest output per role. Once the state is terminal every mutator refuses
//! with [`Error::InvalidTransition`].
//!
//! # Examples
//!
//! ```rust
//! use promptsmith_core::session::{Session, SessionStatus};
//! use promptsmith_core::state_machine::OrchestrationState;
//!
//! let mut session = Session::new("Build a recipe assistant", 3, 2).unwrap();
//! assert_eq!(session.state, OrchestrationState::Initializing);
//!
//! session.transition_to(OrchestrationState::RequirementsAnalysis).unwrap();
//! session.record_intervention("Vegetarian recipes only").unwrap();
//! assert_eq!(session.user_intervention_count, 1);
//! assert_eq!(session.status(false), SessionStatus::Active);
//! ```

use crate::agent::AgentRole;
use crate::ledger::ConversationLedger;
use crate::state_machine::OrchestrationState;
use crate::turn::{MessageCategory, Turn};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Latest successful output of one role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOutput {
    pub turn_id: Uuid,
    pub sequence: u64,
    pub content: String,
    pub category: MessageCategory,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Turn> for AgentOutput {
    fn from(turn: &Turn) -> Self {
        Self {
            turn_id: turn.id,
            sequence: turn.sequence,
            content: turn.content.clone(),
            category: turn.category,
            confidence: turn.confidence,
            timestamp: turn.created_at,
        }
    }
}

/// Derived, caller-facing session status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    WaitingForUser,
    Processing,
    Completed,
    Failed,
}

/// Collaboration session aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub requirements: String,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub user_intervention_count: u32,
    pub max_interventions: u32,
    pub state: OrchestrationState,
    pub final_artifact: Option<String>,
    pub per_agent_outputs: BTreeMap<AgentRole, AgentOutput>,
    pub supplementary_inputs: Vec<String>,
    /// Set when the last recorded outcome asked the user for input
    pub awaiting_user_input: bool,
    pub cancelled: bool,
    pub last_error: Option<String>,
    /// Bumped on every mutation
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session in the `Initializing` state
    pub fn new<S: Into<String>>(
        requirements: S,
        max_iterations: u32,
        max_interventions: u32,
    ) -> Result<Self> {
        let requirements = requirements.into();
        Self::validate_requirements(&requirements)?;
        if max_iterations == 0 {
            return Err(Error::validation("max_iterations must be at least 1"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            requirements,
            current_iteration: 0,
            max_iterations,
            user_intervention_count: 0,
            max_interventions,
            state: OrchestrationState::Initializing,
            final_artifact: None,
            per_agent_outputs: BTreeMap::new(),
            supplementary_inputs: Vec::new(),
            awaiting_user_input: false,
            cancelled: false,
            last_error: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    fn validate_requirements(requirements: &str) -> Result<()> {
        if requirements.trim().is_empty() {
            return Err(Error::validation("Requirements cannot be empty"));
        }
        if requirements.len() > 10_000 {
            return Err(Error::constraint_violation(
                "requirements_length",
                "Requirements cannot exceed 10000 characters",
            ));
        }
        Ok(())
    }

    /// Check the budget invariants of a session that was not built through
    /// [`Session::new`], such as one read back from a snapshot or a database
    pub fn validate_invariants(&self) -> Result<()> {
        Self::validate_requirements(&self.requirements)?;
        if self.max_iterations == 0 {
            return Err(Error::validation("max_iterations must be at least 1"));
        }
        if self.current_iteration > self.max_iterations {
            return Err(Error::validation(format!(
                "current_iteration {} exceeds max_iterations {}",
                self.current_iteration, self.max_iterations
            )));
        }
        if self.user_intervention_count > self.max_interventions {
            return Err(Error::validation(format!(
                "user_intervention_count {} exceeds max_interventions {}",
                self.user_intervention_count, self.max_interventions
            )));
        }
        Ok(())
    }

    /// Every latest output must point at a turn of the session's own ledger
    pub fn validate_outputs(&self, ledger: &ConversationLedger) -> Result<()> {
        for (role, output) in &self.per_agent_outputs {
            if ledger.get(output.turn_id).is_none() {
                return Err(Error::validation(format!(
                    "Latest {} output refers to turn {}, which is not in the ledger",
                    role, output.turn_id
                )));
            }
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Refuse mutation of terminal or cancelled sessions
    pub fn ensure_mutable(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::invalid_transition(format!(
                "Session {} is {} and cannot change",
                self.id, self.state
            )));
        }
        if self.cancelled {
            return Err(Error::invalid_transition(format!(
                "Session {} has been cancelled",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    pub fn transition_to(&mut self, state: OrchestrationState) -> Result<()> {
        self.ensure_mutable()?;
        self.state = state;
        self.touch();
        Ok(())
    }

    /// Close a review round. Returns `false` when the budget is already spent.
    pub fn advance_iteration(&mut self) -> Result<bool> {
        self.ensure_mutable()?;
        if self.current_iteration >= self.max_iterations {
            return Ok(false);
        }
        self.current_iteration += 1;
        self.touch();
        Ok(true)
    }

    pub fn iterations_exhausted(&self) -> bool {
        self.current_iteration >= self.max_iterations
    }

    /// Accept a supplementary user input, counting it against the budget
    pub fn record_intervention<S: Into<String>>(&mut self, text: S) -> Result<()> {
        self.ensure_mutable()?;
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::validation("User input cannot be empty"));
        }
        if self.user_intervention_count >= self.max_interventions {
            return Err(Error::budget_exceeded("interventions", self.max_interventions));
        }
        self.user_intervention_count += 1;
        self.supplementary_inputs.push(text);
        self.awaiting_user_input = false;
        self.touch();
        Ok(())
    }

    /// Record a successful agent turn as that role's latest output
    pub fn record_output(&mut self, turn: &Turn) -> Result<()> {
        self.ensure_mutable()?;
        let role = turn
            .role
            .ok_or_else(|| Error::validation("Only agent turns carry role output"))?;
        self.per_agent_outputs.insert(role, AgentOutput::from(turn));
        self.awaiting_user_input = turn.category.requires_user_input();
        self.last_error = None;
        self.touch();
        Ok(())
    }

    /// Remember a failed invocation without touching state or budgets
    pub fn record_failure<S: Into<String>>(&mut self, message: S) {
        self.last_error = Some(message.into());
        self.touch();
    }

    pub fn complete<S: Into<String>>(&mut self, artifact: S) -> Result<()> {
        self.ensure_mutable()?;
        self.final_artifact = Some(artifact.into());
        self.state = OrchestrationState::Completed;
        self.awaiting_user_input = false;
        self.touch();
        Ok(())
    }

    /// Move to `Failed`, retaining the triggering error
    pub fn fail<S: Into<String>>(&mut self, error: S) {
        if self.is_terminal() {
            return;
        }
        self.state = OrchestrationState::Failed;
        self.last_error = Some(error.into());
        self.awaiting_user_input = false;
        self.touch();
    }

    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.touch();
    }

    pub fn status(&self, processing: bool) -> SessionStatus {
        match self.state {
            OrchestrationState::Completed => SessionStatus::Completed,
            OrchestrationState::Failed => SessionStatus::Failed,
            _ if processing => SessionStatus::Processing,
            _ if self.awaiting_user_input => SessionStatus::WaitingForUser,
            _ => SessionStatus::Active,
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.updated_at - self.created_at).num_seconds()
    }

    /// Turn counts per role, user input under `"user"`
    pub fn participation(&self, ledger: &ConversationLedger) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for turn in ledger.turns() {
            let key = turn.role.map(|r| r.as_str()).unwrap_or("user");
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self, ledger: &ConversationLedger, processing: bool) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            state: self.state,
            status: self.status(processing),
            current_iteration: self.current_iteration,
            max_iterations: self.max_iterations,
            user_intervention_count: self.user_intervention_count,
            max_interventions: self.max_interventions,
            latest_turns: self.per_agent_outputs.clone(),
            requires_user_input: self.awaiting_user_input && !self.is_terminal(),
            completed: self.state == OrchestrationState::Completed,
            cancelled: self.cancelled,
            final_artifact: self.final_artifact.clone(),
            last_error: self.last_error.clone(),
            turn_count: ledger.len(),
            participation: self.participation(ledger),
            last_activity: self.updated_at,
        }
    }
}

/// Structured result returned by every orchestrator entry point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub state: OrchestrationState,
    pub status: SessionStatus,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub user_intervention_count: u32,
    pub max_interventions: u32,
    pub latest_turns: BTreeMap<AgentRole, AgentOutput>,
    pub requires_user_input: bool,
    pub completed: bool,
    pub cancelled: bool,
    pub final_artifact: Option<String>,
    pub last_error: Option<String>,
    pub turn_count: usize,
    pub participation: BTreeMap<String, usize>,
    pub last_activity: DateTime<Utc>,
}
