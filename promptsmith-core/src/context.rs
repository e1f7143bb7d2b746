//! Agent context: the bounded, read-only view handed to an agent per invocation
//!
//! A context is a projection of the session and its ledger. It is never
//! persisted and must be rebuilt whenever either of them changes; the
//! `revision` it carries is the session revision it was built from, which lets
//! caches detect staleness.

use crate::agent::AgentRole;
use crate::classifier::DecisionClassifier;
use crate::ledger::ConversationLedger;
use crate::session::{AgentOutput, Session};
use crate::state_machine::OrchestrationState;
use crate::turn::{MessageCategory, Turn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything an agent sees before it generates text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentContext {
    pub session_id: Uuid,
    pub revision: u64,
    pub state: OrchestrationState,
    pub requirements: String,
    /// Ordered turn history, possibly truncated to the most recent N
    pub history: Vec<Turn>,
    pub latest_outputs: BTreeMap<AgentRole, AgentOutput>,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub user_intervention_count: u32,
    pub max_interventions: u32,
    pub supplementary_inputs: Vec<String>,
    /// User inputs received since the most recent agent turn
    pub pending_inputs: Vec<String>,
}

impl AgentContext {
    pub fn latest(&self, role: AgentRole) -> Option<&AgentOutput> {
        self.latest_outputs.get(&role)
    }

    /// Most recent Team Lead verdict text
    pub fn latest_feedback(&self) -> Option<&str> {
        self.latest(AgentRole::TeamLead).map(|o| o.content.as_str())
    }

    pub fn is_final_round(&self) -> bool {
        DecisionClassifier::is_final_round(self.current_iteration, self.max_iterations)
    }

    /// Whether another user intervention fits in the budget
    pub fn can_request_input(&self) -> bool {
        self.user_intervention_count < self.max_interventions
    }
}

/// Builds [`AgentContext`] values from a session and its ledger
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    history_window: Option<usize>,
}

impl ContextBuilder {
    /// Keep only the most recent `window` turns in the history
    pub fn with_history_window(window: usize) -> Self {
        Self {
            history_window: Some(window),
        }
    }

    pub fn history_window(&self) -> Option<usize> {
        self.history_window
    }

    pub fn build(&self, session: &Session, ledger: &ConversationLedger) -> AgentContext {
        let turns = ledger.turns();
        let start = match self.history_window {
            Some(window) => turns.len().saturating_sub(window),
            None => 0,
        };
        let history = turns[start..].to_vec();

        let latest_outputs = AgentRole::ALL
            .iter()
            .filter_map(|role| {
                ledger
                    .latest_by_role(*role)
                    .map(|turn| (*role, AgentOutput::from(turn)))
            })
            .collect();

        let last_agent_sequence = turns
            .iter()
            .rev()
            .find(|t| t.role.is_some() && t.category != MessageCategory::Error)
            .map(|t| t.sequence)
            .unwrap_or(0);
        let pending_inputs = turns
            .iter()
            .filter(|t| t.is_user_input() && t.sequence > last_agent_sequence)
            .map(|t| t.content.clone())
            .collect();

        AgentContext {
            session_id: session.id,
            revision: session.revision,
            state: session.state,
            requirements: session.requirements.clone(),
            history,
            latest_outputs,
            current_iteration: session.current_iteration,
            max_iterations: session.max_iterations,
            user_intervention_count: session.user_intervention_count,
            max_interventions: session.max_interventions,
            supplementary_inputs: session.supplementary_inputs.clone(),
            pending_inputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_turn(session_id: Uuid, role: AgentRole, content: &str) -> Turn {
        Turn::builder()
            .session_id(session_id)
            .role(role)
            .content(content)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_projects_session_and_ledger() {
        let session = Session::new("Build a todo app", 4, 2).unwrap();
        let mut ledger = ConversationLedger::new(session.id);
        ledger
            .append(agent_turn(session.id, AgentRole::ProductManager, "Requirements v1"))
            .unwrap();
        ledger
            .append(agent_turn(session.id, AgentRole::Developer, "Design v1"))
            .unwrap();

        let ctx = ContextBuilder::default().build(&session, &ledger);
        assert_eq!(ctx.requirements, "Build a todo app");
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.latest(AgentRole::Developer).unwrap().content, "Design v1");
        assert!(ctx.latest(AgentRole::TeamLead).is_none());
        assert!(ctx.pending_inputs.is_empty());
        assert!(!ctx.is_final_round());
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let session = Session::new("Build a todo app", 4, 2).unwrap();
        let mut ledger = ConversationLedger::new(session.id);
        for i in 0..5 {
            ledger
                .append(agent_turn(
                    session.id,
                    AgentRole::Developer,
                    &format!("Design v{}", i),
                ))
                .unwrap();
        }

        let ctx = ContextBuilder::with_history_window(2).build(&session, &ledger);
        let sequences: Vec<u64> = ctx.history.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![4, 5]);
    }

    #[test]
    fn test_pending_inputs_follow_last_agent_turn() {
        let mut session = Session::new("Build a todo app", 4, 2).unwrap();
        let mut ledger = ConversationLedger::new(session.id);
        ledger
            .append(Turn::user_input(session.id, "Early note").unwrap())
            .unwrap();
        ledger
            .append(agent_turn(session.id, AgentRole::ProductManager, "Requirements v1"))
            .unwrap();
        session.record_intervention("Target tablets too").unwrap();
        ledger
            .append(Turn::user_input(session.id, "Target tablets too").unwrap())
            .unwrap();

        let ctx = ContextBuilder::default().build(&session, &ledger);
        assert_eq!(ctx.pending_inputs, vec!["Target tablets too".to_string()]);
        assert_eq!(ctx.supplementary_inputs, vec!["Target tablets too".to_string()]);
        assert_eq!(ctx.user_intervention_count, 1);
        assert!(ctx.can_request_input());
    }

    #[test]
    fn test_context_revision_tracks_session() {
        let mut session = Session::new("Build a todo app", 4, 2).unwrap();
        let ledger = ConversationLedger::new(session.id);
        let before = ContextBuilder::default().build(&session, &ledger);
        session.advance_iteration().unwrap();
        let after = ContextBuilder::default().build(&session, &ledger);
        assert!(after.revision > before.revision);
        assert_eq!(after.current_iteration, 1);
    }
}
