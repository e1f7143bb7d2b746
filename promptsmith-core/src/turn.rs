//! Turn model: one recorded contribution to a collaboration session
//!
//! A turn is created by the orchestrator after an agent (or the user) has
//! produced text. It is immutable once appended to the ledger except for the
//! explicit edit operation, which flags the turn as edited and stamps the
//! edit time.
//!
//! # Examples
//!
//! ```rust
//! use promptsmith_core::agent::AgentRole;
//! use promptsmith_core::turn::{MessageCategory, Turn};
//! use uuid::Uuid;
//!
//! let turn = Turn::builder()
//!     .session_id(Uuid::new_v4())
//!     .role(AgentRole::ProductManager)
//!     .content("## Requirements\n- Users can create tasks")
//!     .category(MessageCategory::Requirement)
//!     .confidence(0.9)
//!     .build()
//!     .unwrap();
//!
//! assert!(!turn.edited);
//! assert_eq!(turn.sequence, 0);
//! ```

use crate::agent::AgentRole;
use crate::classifier::Decision;
use crate::validation::ValidationIssue;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form structured annotations attached to a turn
pub type TurnMetadata = BTreeMap<String, serde_json::Value>;

/// Classified outcome of a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    Requirement,
    TechnicalSolution,
    Review,
    Approval,
    Rejection,
    Question,
    Clarification,
    UserInput,
    Error,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::Requirement => "requirement",
            MessageCategory::TechnicalSolution => "technical_solution",
            MessageCategory::Review => "review",
            MessageCategory::Approval => "approval",
            MessageCategory::Rejection => "rejection",
            MessageCategory::Question => "question",
            MessageCategory::Clarification => "clarification",
            MessageCategory::UserInput => "user_input",
            MessageCategory::Error => "error",
        }
    }

    /// Decision this category feeds into the transition function.
    ///
    /// Ordinary PM and Developer output is normal progression (`Review`).
    pub fn decision(&self) -> Decision {
        match self {
            MessageCategory::Approval => Decision::Approval,
            MessageCategory::Rejection => Decision::Rejection,
            MessageCategory::Question | MessageCategory::Clarification => Decision::Question,
            _ => Decision::Review,
        }
    }

    /// Whether the session should wait for user input after this outcome
    pub fn requires_user_input(&self) -> bool {
        matches!(self, MessageCategory::Question | MessageCategory::Clarification)
    }
}

impl From<Decision> for MessageCategory {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approval => MessageCategory::Approval,
            Decision::Rejection => MessageCategory::Rejection,
            Decision::Question => MessageCategory::Question,
            Decision::Review => MessageCategory::Review,
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "requirement" => Ok(MessageCategory::Requirement),
            "technical_solution" => Ok(MessageCategory::TechnicalSolution),
            "review" => Ok(MessageCategory::Review),
            "approval" => Ok(MessageCategory::Approval),
            "rejection" => Ok(MessageCategory::Rejection),
            "question" => Ok(MessageCategory::Question),
            "clarification" => Ok(MessageCategory::Clarification),
            "user_input" => Ok(MessageCategory::UserInput),
            "error" => Ok(MessageCategory::Error),
            other => Err(Error::validation(format!("Unknown message category: {}", other))),
        }
    }
}

/// One recorded contribution to a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Assigned by the ledger on append; 0 until then
    pub sequence: u64,
    /// `None` for user-supplied input
    pub role: Option<AgentRole>,
    pub content: String,
    pub category: MessageCategory,
    pub confidence: f64,
    pub issues: Vec<ValidationIssue>,
    pub parent_id: Option<Uuid>,
    pub metadata: TurnMetadata,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub edit_reason: Option<String>,
}

impl Turn {
    /// Create a builder for constructing a Turn
    pub fn builder() -> TurnBuilder {
        TurnBuilder::new()
    }

    /// A supplementary input provided by the user mid-collaboration
    pub fn user_input<S: Into<String>>(session_id: Uuid, content: S) -> Result<Self> {
        Self::builder()
            .session_id(session_id)
            .content(content)
            .category(MessageCategory::UserInput)
            .confidence(1.0)
            .build()
    }

    /// A failed agent invocation, recorded for auditability.
    ///
    /// Failure turns may carry empty content, so they bypass the builder's
    /// content check.
    pub fn failure(session_id: Uuid, role: AgentRole, error: &Error) -> Self {
        let mut metadata = TurnMetadata::new();
        metadata.insert("error".to_string(), serde_json::json!(error.to_string()));
        metadata.insert(
            "error_category".to_string(),
            serde_json::json!(error.category()),
        );
        metadata.insert(
            "recoverable".to_string(),
            serde_json::json!(error.is_recoverable()),
        );

        Self {
            id: Uuid::new_v4(),
            session_id,
            sequence: 0,
            role: Some(role),
            content: String::new(),
            category: MessageCategory::Error,
            confidence: 0.0,
            issues: Vec::new(),
            parent_id: None,
            metadata,
            created_at: Utc::now(),
            edited: false,
            edited_at: None,
            edit_reason: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.category == MessageCategory::Error
    }

    pub fn is_user_input(&self) -> bool {
        self.role.is_none()
    }

    /// Label for transcripts: the agent's display name or "User"
    pub fn speaker(&self) -> &'static str {
        self.role.map(|r| r.display_name()).unwrap_or("User")
    }

    /// Replace the content, flagging the turn as edited.
    pub fn apply_edit<S: Into<String>>(&mut self, content: S, reason: Option<String>) -> Result<()> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::validation("Edited content cannot be empty"));
        }
        self.content = content;
        self.edited = true;
        self.edited_at = Some(Utc::now());
        self.edit_reason = reason;
        Ok(())
    }
}

/// Builder for creating Turn instances
#[derive(Debug, Default)]
pub struct TurnBuilder {
    session_id: Option<Uuid>,
    role: Option<AgentRole>,
    content: Option<String>,
    category: Option<MessageCategory>,
    confidence: Option<f64>,
    issues: Vec<ValidationIssue>,
    parent_id: Option<Uuid>,
    metadata: TurnMetadata,
}

impl TurnBuilder {
    /// Create a new turn builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owning session
    pub fn session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the authoring agent role
    pub fn role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the turn content
    pub fn content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the classified category
    pub fn category(mut self, category: MessageCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the confidence score (0.0 - 1.0)
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Attach validation issues
    pub fn issues(mut self, issues: Vec<ValidationIssue>) -> Self {
        self.issues = issues;
        self
    }

    /// Thread this turn under a parent turn
    pub fn parent_id(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Add a metadata entry
    pub fn metadata<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Build the Turn instance
    pub fn build(self) -> Result<Turn> {
        let session_id = self
            .session_id
            .ok_or_else(|| Error::validation("Turn session_id is required"))?;
        let content = self
            .content
            .ok_or_else(|| Error::validation("Turn content is required"))?;
        if content.trim().is_empty() {
            return Err(Error::validation("Turn content cannot be empty"));
        }

        let category = match (self.category, self.role) {
            (Some(category), _) => category,
            (None, Some(role)) => role.default_category(),
            (None, None) => MessageCategory::UserInput,
        };

        let confidence = self.confidence.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::validation(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                confidence
            )));
        }

        Ok(Turn {
            id: Uuid::new_v4(),
            session_id,
            sequence: 0,
            role: self.role,
            content,
            category,
            confidence,
            issues: self.issues,
            parent_id: self.parent_id,
            metadata: self.metadata,
            created_at: Utc::now(),
            edited: false,
            edited_at: None,
            edit_reason: None,
        })
    }
}
