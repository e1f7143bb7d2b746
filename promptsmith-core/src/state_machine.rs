//! Orchestration state machine
//!
//! ```text
//!  INITIALIZING
//!       |
//!       v
//!  REQUIREMENTS_ANALYSIS --> TECHNICAL_DESIGN --> TEAM_LEAD_REVIEW <------+
//!                                                     |     |             |
//!                                          APPROVAL   |     | REJECTION   |
//!                                                     v     v             |
//!                                              COMPLETED  FEEDBACK_PROCESSING
//!                                                  ^          |
//!                                                  |          | last round
//!                                                  |          v
//!                                                  +---- FINAL_APPROVAL
//!
//!  FAILED is reachable from any non-terminal state.
//! ```
//!
//! Both functions here are pure; the orchestrator applies their results to
//! the session under the session lock.

use crate::agent::AgentRole;
use crate::classifier::Decision;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationState {
    Initializing,
    RequirementsAnalysis,
    TechnicalDesign,
    TeamLeadReview,
    FeedbackProcessing,
    FinalApproval,
    Completed,
    Failed,
}

impl OrchestrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestrationState::Completed | OrchestrationState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestrationState::Initializing => "INITIALIZING",
            OrchestrationState::RequirementsAnalysis => "REQUIREMENTS_ANALYSIS",
            OrchestrationState::TechnicalDesign => "TECHNICAL_DESIGN",
            OrchestrationState::TeamLeadReview => "TEAM_LEAD_REVIEW",
            OrchestrationState::FeedbackProcessing => "FEEDBACK_PROCESSING",
            OrchestrationState::FinalApproval => "FINAL_APPROVAL",
            OrchestrationState::Completed => "COMPLETED",
            OrchestrationState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrchestrationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INITIALIZING" => Ok(OrchestrationState::Initializing),
            "REQUIREMENTS_ANALYSIS" => Ok(OrchestrationState::RequirementsAnalysis),
            "TECHNICAL_DESIGN" => Ok(OrchestrationState::TechnicalDesign),
            "TEAM_LEAD_REVIEW" => Ok(OrchestrationState::TeamLeadReview),
            "FEEDBACK_PROCESSING" => Ok(OrchestrationState::FeedbackProcessing),
            "FINAL_APPROVAL" => Ok(OrchestrationState::FinalApproval),
            "COMPLETED" => Ok(OrchestrationState::Completed),
            "FAILED" => Ok(OrchestrationState::Failed),
            other => Err(Error::validation(format!("Unknown state: {}", other))),
        }
    }
}

/// Transition function.
///
/// APPROVAL completes from either review state; elsewhere it sends the
/// session to review. QUESTION re-enters the current state.
pub fn next_state(
    current: OrchestrationState,
    decision: Decision,
    current_iteration: u32,
    max_iterations: u32,
) -> OrchestrationState {
    use OrchestrationState::*;

    if current.is_terminal() {
        return current;
    }

    match decision {
        Decision::Approval => match current {
            TeamLeadReview | FinalApproval => Completed,
            _ => TeamLeadReview,
        },
        Decision::Rejection => FeedbackProcessing,
        Decision::Question => current,
        Decision::Review => match current {
            RequirementsAnalysis => TechnicalDesign,
            TechnicalDesign => TeamLeadReview,
            FeedbackProcessing if current_iteration + 1 >= max_iterations => FinalApproval,
            FeedbackProcessing => TeamLeadReview,
            other => other,
        },
    }
}

/// Role that acts in `state`.
///
/// `FEEDBACK_PROCESSING` routes on the rejection text: a mention of
/// "requirements" goes back to the Product Manager.
pub fn select_agent(state: OrchestrationState, last_feedback: Option<&str>) -> Option<AgentRole> {
    match state {
        OrchestrationState::RequirementsAnalysis => Some(AgentRole::ProductManager),
        OrchestrationState::TechnicalDesign => Some(AgentRole::Developer),
        OrchestrationState::TeamLeadReview | OrchestrationState::FinalApproval => {
            Some(AgentRole::TeamLead)
        }
        OrchestrationState::FeedbackProcessing => {
            let mentions_requirements = last_feedback
                .map(|text| text.to_lowercase().contains("requirements"))
                .unwrap_or(false);
            if mentions_requirements {
                Some(AgentRole::ProductManager)
            } else {
                Some(AgentRole::Developer)
            }
        }
        OrchestrationState::Initializing
        | OrchestrationState::Completed
        | OrchestrationState::Failed => None,
    }
}
