//! Orchestrator behaviour with durable storage attached

mod common;

use async_trait::async_trait;
use common::*;
use promptsmith_engine::core::agent::AgentRole;
use promptsmith_engine::core::ledger::{ConversationLedger, TurnFilter};
use promptsmith_engine::core::session::{Session, SessionStatus};
use promptsmith_engine::core::state_machine::OrchestrationState;
use promptsmith_engine::storage::{
    DatabaseConfig, Error as StorageError, Result as StorageResult, SessionPersistence,
    StorageManager,
};
use promptsmith_engine::{Orchestrator, SessionEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;
use uuid::Uuid;

async fn memory_storage() -> Arc<StorageManager> {
    Arc::new(
        StorageManager::new(&DatabaseConfig::in_memory())
            .await
            .unwrap(),
    )
}

fn with_persistence(
    generator: Arc<ScriptedGenerator>,
    persistence: Arc<dyn SessionPersistence>,
) -> Orchestrator {
    Orchestrator::builder(generator)
        .settings(settings(3, 2, 1))
        .persistence(persistence)
        .build()
        .unwrap()
}

/// Persistence that accepts `healthy_saves` writes and then refuses
struct FlakyPersistence {
    inner: Arc<StorageManager>,
    healthy_saves: usize,
    saves: AtomicUsize,
}

impl FlakyPersistence {
    fn new(inner: Arc<StorageManager>, healthy_saves: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            healthy_saves,
            saves: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionPersistence for FlakyPersistence {
    async fn save(&self, session: &Session, ledger: &ConversationLedger) -> StorageResult<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) >= self.healthy_saves {
            return Err(StorageError::Corrupt("disk full".to_string()));
        }
        self.inner.save(session, ledger).await
    }

    async fn load(&self, id: Uuid) -> StorageResult<Option<(Session, ConversationLedger)>> {
        self.inner.load(id).await
    }

    async fn delete(&self, id: Uuid) -> StorageResult<()> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> StorageResult<Vec<Session>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_session_reloads_in_another_orchestrator() {
    let storage = memory_storage().await;
    let first = with_persistence(
        ScriptedGenerator::replies(&[PM_REQUIREMENTS, DEV_SOLUTION]),
        storage.clone(),
    );
    let id = first.start(REQUIREMENTS, 3, 2).await.unwrap().session_id;
    first.advance(id, None).await.unwrap();
    let before = first.export(id).await.unwrap();

    let generator = ScriptedGenerator::replies(&[TL_APPROVE]);
    let second = with_persistence(generator.clone(), storage.clone());
    let reloaded = second.export(id).await.unwrap();
    assert_eq!(reloaded.session.state, before.session.state);
    assert_eq!(reloaded.session.revision, before.session.revision);
    assert_eq!(reloaded.ledger.next_sequence, before.ledger.next_sequence);
    let ids = |turns: &[promptsmith_engine::core::turn::Turn]| {
        turns.iter().map(|t| (t.id, t.sequence)).collect::<Vec<_>>()
    };
    assert_eq!(ids(&reloaded.ledger.turns), ids(&before.ledger.turns));

    let listed = second.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].session_id, id);
    assert_eq!(listed[0].state, OrchestrationState::TeamLeadReview);

    // Resumes where the first orchestrator stopped
    let summary = second.advance(id, None).await.unwrap();
    assert_eq!(summary.state, OrchestrationState::Completed);
    assert_eq!(generator.calls(), 1);

    let (session, ledger) = storage.load(id).await.unwrap().unwrap();
    assert_eq!(session.state, OrchestrationState::Completed);
    assert_eq!(ledger.len(), 3);
    assert_eq!(
        session.final_artifact.as_deref(),
        Some("You are a recipe assistant that suggests dishes from the ingredients a user has.")
    );
}

#[tokio::test]
async fn test_file_database_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite:{}", dir.path().join("sessions.db").display()),
        ..DatabaseConfig::default()
    };

    let id = {
        let storage = Arc::new(StorageManager::new(&config).await.unwrap());
        let orchestrator =
            with_persistence(ScriptedGenerator::replies(&[PM_REQUIREMENTS]), storage.clone());
        let id = orchestrator.start(REQUIREMENTS, 3, 2).await.unwrap().session_id;
        storage.pool().close().await;
        id
    };

    let storage = Arc::new(StorageManager::new(&config).await.unwrap());
    let orchestrator = with_persistence(ScriptedGenerator::replies(&[DEV_SOLUTION]), storage);
    let summary = orchestrator.advance(id, None).await.unwrap();
    assert_eq!(summary.state, OrchestrationState::TeamLeadReview);

    let turns = orchestrator.turns(id, &TurnFilter::default()).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].sequence, 2);
    assert_eq!(turns[0].role, Some(AgentRole::ProductManager));
}

#[tokio::test]
async fn test_cancelled_session_stays_cancelled_after_reload() {
    let storage = memory_storage().await;
    let first = with_persistence(ScriptedGenerator::replies(&[PM_REQUIREMENTS]), storage.clone());
    let id = first.start(REQUIREMENTS, 3, 2).await.unwrap().session_id;
    first.cancel(id).await.unwrap();

    let generator = ScriptedGenerator::replies(&[DEV_SOLUTION]);
    let second = with_persistence(generator.clone(), storage);
    assert!(second.status(id).await.unwrap().cancelled);
    assert!(second.advance(id, None).await.is_err());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_failed_first_save_fails_session_before_generation() {
    let storage = memory_storage().await;
    let generator = ScriptedGenerator::replies(&[PM_REQUIREMENTS]);
    let orchestrator = with_persistence(generator.clone(), FlakyPersistence::new(storage, 0));
    let mut events = orchestrator.notifier().subscribe();

    let summary = assert_ok!(orchestrator.start(REQUIREMENTS, 3, 2).await);
    assert_eq!(summary.state, OrchestrationState::Failed);
    assert_eq!(summary.status, SessionStatus::Failed);
    assert!(summary
        .last_error
        .unwrap()
        .starts_with("persistence failure"));
    assert_eq!(summary.turn_count, 0);
    assert_eq!(generator.calls(), 0);

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Failed { .. }) {
            failed = true;
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn test_save_failure_after_turn_keeps_the_turn() {
    let storage = memory_storage().await;
    let generator = ScriptedGenerator::replies(&[PM_REQUIREMENTS, DEV_SOLUTION]);
    let orchestrator = with_persistence(generator.clone(), FlakyPersistence::new(storage, 1));

    let summary = orchestrator.start(REQUIREMENTS, 3, 2).await.unwrap();
    assert_eq!(summary.state, OrchestrationState::Failed);
    assert_eq!(summary.turn_count, 1);
    assert!(summary.latest_turns.contains_key(&AgentRole::ProductManager));

    let err = orchestrator
        .advance(summary.session_id, None)
        .await
        .unwrap_err();
    assert!(err.as_core().is_some());
    assert_eq!(generator.calls(), 1);
}
