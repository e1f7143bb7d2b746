//! Collaboration roles and their dispatch profiles
//!
//! The collaboration has exactly three participants. Everything that varies
//! by participant (sampling profile, behaviour mode, the category its output
//! carries) is resolved through [`AgentRole`] rather than by inspecting names.
//!
//! # Examples
//!
//! ```rust
//! use promptsmith_core::agent::{AgentProfile, AgentRole};
//!
//! let role: AgentRole = "team_lead".parse().unwrap();
//! assert_eq!(role, AgentRole::TeamLead);
//! assert_eq!(role.display_name(), "Team Lead");
//!
//! let profile = AgentProfile::default_for(role);
//! assert!(profile.temperature < AgentProfile::default_for(AgentRole::ProductManager).temperature);
//! ```

use crate::context::AgentContext;
use crate::turn::MessageCategory;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed collaboration participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProductManager,
    Developer,
    TeamLead,
}

impl AgentRole {
    pub const ALL: [AgentRole; 3] = [
        AgentRole::ProductManager,
        AgentRole::Developer,
        AgentRole::TeamLead,
    ];

    /// Stable identifier used in storage and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProductManager => "product_manager",
            AgentRole::Developer => "developer",
            AgentRole::TeamLead => "team_lead",
        }
    }

    /// Human readable name used in prompts and transcripts
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::ProductManager => "Product Manager",
            AgentRole::Developer => "Technical Developer",
            AgentRole::TeamLead => "Team Lead",
        }
    }

    /// Category carried by this role's ordinary output.
    ///
    /// Team Lead output is classified per turn, so `Review` is only a placeholder.
    pub fn default_category(&self) -> MessageCategory {
        match self {
            AgentRole::ProductManager => MessageCategory::Requirement,
            AgentRole::Developer => MessageCategory::TechnicalSolution,
            AgentRole::TeamLead => MessageCategory::Review,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "product_manager" | "pm" => Ok(AgentRole::ProductManager),
            "developer" | "technical_developer" | "dev" => Ok(AgentRole::Developer),
            "team_lead" | "lead" => Ok(AgentRole::TeamLead),
            other => Err(Error::validation(format!("Unknown agent role: {}", other))),
        }
    }
}

/// Sampling parameters passed to the text-generation capability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AgentProfile {
    pub fn new(temperature: f32, max_tokens: u32) -> Result<Self> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::validation(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                temperature
            )));
        }
        if max_tokens == 0 {
            return Err(Error::validation("max_tokens must be greater than 0"));
        }
        Ok(Self {
            temperature,
            max_tokens,
        })
    }

    /// Built-in profile per role: creative requirements, precise review
    pub fn default_for(role: AgentRole) -> Self {
        match role {
            AgentRole::ProductManager => Self {
                temperature: 0.8,
                max_tokens: 2000,
            },
            AgentRole::Developer => Self {
                temperature: 0.6,
                max_tokens: 2500,
            },
            AgentRole::TeamLead => Self {
                temperature: 0.4,
                max_tokens: 2000,
            },
        }
    }

    /// Profile used for the Team Lead's final, forced decision
    pub fn final_review() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Behaviour a role adopts for a particular invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    RequirementsAnalysis,
    RequirementsRefinement,
    InitialDesign,
    FeedbackIncorporation,
    DesignRefinement,
    InitialReview,
    IntermediateReview,
    FinalApproval,
}

impl AgentMode {
    /// Select the mode for `role` from the invocation context.
    pub fn select(role: AgentRole, context: &AgentContext) -> Self {
        match role {
            AgentRole::ProductManager => {
                if context.latest(AgentRole::ProductManager).is_none() {
                    AgentMode::RequirementsAnalysis
                } else {
                    AgentMode::RequirementsRefinement
                }
            }
            AgentRole::Developer => {
                if context.current_iteration == 0 && context.latest(AgentRole::TeamLead).is_none() {
                    AgentMode::InitialDesign
                } else if context.latest(AgentRole::TeamLead).is_some() {
                    AgentMode::FeedbackIncorporation
                } else {
                    AgentMode::DesignRefinement
                }
            }
            AgentRole::TeamLead => {
                if context.is_final_round() {
                    AgentMode::FinalApproval
                } else if context.current_iteration == 0 {
                    AgentMode::InitialReview
                } else {
                    AgentMode::IntermediateReview
                }
            }
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            AgentMode::RequirementsAnalysis | AgentMode::RequirementsRefinement => {
                AgentRole::ProductManager
            }
            AgentMode::InitialDesign
            | AgentMode::FeedbackIncorporation
            | AgentMode::DesignRefinement => AgentRole::Developer,
            AgentMode::InitialReview | AgentMode::IntermediateReview | AgentMode::FinalApproval => {
                AgentRole::TeamLead
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::RequirementsAnalysis => "requirements_analysis",
            AgentMode::RequirementsRefinement => "requirements_refinement",
            AgentMode::InitialDesign => "initial_design",
            AgentMode::FeedbackIncorporation => "feedback_incorporation",
            AgentMode::DesignRefinement => "design_refinement",
            AgentMode::InitialReview => "initial_review",
            AgentMode::IntermediateReview => "intermediate_review",
            AgentMode::FinalApproval => "final_approval",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;
    use crate::ledger::ConversationLedger;
    use crate::session::Session;
    use crate::turn::Turn;

    fn context_for(session: &Session, ledger: &ConversationLedger) -> AgentContext {
        ContextBuilder::default().build(session, ledger)
    }

    #[test]
    fn test_role_parsing_and_display() {
        for role in AgentRole::ALL {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), role);
            assert_eq!(role.to_string(), role.as_str());
        }
        assert!("designer".parse::<AgentRole>().is_err());
    }

    #[test]
    fn test_profile_validation() {
        assert!(AgentProfile::new(0.5, 1000).is_ok());
        assert!(AgentProfile::new(2.5, 1000).is_err());
        assert!(AgentProfile::new(0.5, 0).is_err());
    }

    #[test]
    fn test_team_lead_mode_follows_iteration() {
        let mut session = Session::new("Build a todo app", 3, 2).unwrap();
        let ledger = ConversationLedger::new(session.id);

        let ctx = context_for(&session, &ledger);
        assert_eq!(AgentMode::select(AgentRole::TeamLead, &ctx), AgentMode::InitialReview);

        session.advance_iteration().unwrap();
        let ctx = context_for(&session, &ledger);
        assert_eq!(
            AgentMode::select(AgentRole::TeamLead, &ctx),
            AgentMode::IntermediateReview
        );

        session.advance_iteration().unwrap();
        let ctx = context_for(&session, &ledger);
        assert_eq!(AgentMode::select(AgentRole::TeamLead, &ctx), AgentMode::FinalApproval);
    }

    #[test]
    fn test_developer_mode_after_feedback() {
        let session = Session::new("Build a todo app", 3, 2).unwrap();
        let mut ledger = ConversationLedger::new(session.id);

        let ctx = context_for(&session, &ledger);
        assert_eq!(AgentMode::select(AgentRole::Developer, &ctx), AgentMode::InitialDesign);

        let review = Turn::builder()
            .session_id(session.id)
            .role(AgentRole::TeamLead)
            .content("Needs work on the storage layer.")
            .category(MessageCategory::Rejection)
            .build()
            .unwrap();
        ledger.append(review).unwrap();

        let ctx = context_for(&session, &ledger);
        assert_eq!(
            AgentMode::select(AgentRole::Developer, &ctx),
            AgentMode::FeedbackIncorporation
        );
        assert_eq!(AgentMode::FeedbackIncorporation.role(), AgentRole::Developer);
    }
}
