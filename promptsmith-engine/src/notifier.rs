//! Best-effort session event broadcasting
//!
//! Listeners subscribe to a `tokio::sync::broadcast` channel. Publishing
//! never blocks and never fails the caller: with no listeners the event is
//! dropped, and slow listeners observe `Lagged` on their side.

use chrono::{DateTime, Utc};
use promptsmith_core::agent::AgentRole;
use promptsmith_core::state_machine::OrchestrationState;
use promptsmith_core::turn::{MessageCategory, Turn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Event emitted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    TurnRecorded {
        session_id: Uuid,
        turn_id: Uuid,
        sequence: u64,
        role: Option<AgentRole>,
        category: MessageCategory,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    StateChanged {
        session_id: Uuid,
        from: OrchestrationState,
        to: OrchestrationState,
        current_iteration: u32,
    },
    Completed {
        session_id: Uuid,
        final_artifact: String,
    },
    Failed {
        session_id: Uuid,
        error: String,
    },
    Cancelled {
        session_id: Uuid,
    },
}

impl SessionEvent {
    pub fn turn_recorded(turn: &Turn) -> Self {
        SessionEvent::TurnRecorded {
            session_id: turn.session_id,
            turn_id: turn.id,
            sequence: turn.sequence,
            role: turn.role,
            category: turn.category,
            confidence: turn.confidence,
            timestamp: turn.created_at,
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::TurnRecorded { session_id, .. }
            | SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::Completed { session_id, .. }
            | SessionEvent::Failed { session_id, .. }
            | SessionEvent::Cancelled { session_id } => *session_id,
        }
    }
}

/// Fan-out of session events to any number of listeners
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<SessionEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish without waiting; dropped silently when nobody listens
    pub fn publish(&self, event: SessionEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("No listeners for session event: {:?}", e.0);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = Notifier::new(16);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();
        let session_id = Uuid::new_v4();

        notifier.publish(SessionEvent::Cancelled { session_id });

        assert_eq!(
            first.recv().await.unwrap(),
            SessionEvent::Cancelled { session_id }
        );
        assert_eq!(second.recv().await.unwrap().session_id(), session_id);
        assert_eq!(notifier.listener_count(), 2);
    }

    #[test]
    fn test_publish_without_listeners_is_harmless() {
        let notifier = Notifier::default();
        notifier.publish(SessionEvent::Failed {
            session_id: Uuid::new_v4(),
            error: "boom".to_string(),
        });
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SessionEvent::StateChanged {
            session_id: Uuid::nil(),
            from: OrchestrationState::TechnicalDesign,
            to: OrchestrationState::TeamLeadReview,
            current_iteration: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["to"], "TEAM_LEAD_REVIEW");
    }
}
