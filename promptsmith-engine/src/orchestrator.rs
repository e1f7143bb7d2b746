//! Collaboration orchestrator
//!
//! Drives a session one agent turn at a time. Every entry point resolves the
//! session slot, takes the per-session gate for the whole turn (so at most
//! one invocation is in flight per session), and commits the turn together
//! with its state change under a single write lock. Persistence and
//! notifications happen after the commit.

use crate::notifier::{Notifier, SessionEvent};
use crate::{Error, Result};
use promptsmith_core::agent::{AgentMode, AgentRole};
use promptsmith_core::classifier::{extract_feedback_questions, Decision, DecisionClassifier};
use promptsmith_core::config::OrchestrationSettings;
use promptsmith_core::context::{AgentContext, ContextBuilder};
use promptsmith_core::extractor;
use promptsmith_core::generation::{generate_with_retry, TextGenerator};
use promptsmith_core::ledger::{ConversationLedger, LedgerExport, TurnFilter};
use promptsmith_core::quality::QualityAssessor;
use promptsmith_core::session::{AgentOutput, Session, SessionSummary};
use promptsmith_core::state_machine::{next_state, select_agent, OrchestrationState};
use promptsmith_core::turn::{MessageCategory, Turn};
use promptsmith_core::validation::{ResponseValidator, Severity};
use promptsmith_core::Error as CoreError;
use promptsmith_prompts::PromptManager;
use promptsmith_storage::{
    CacheStats, ContextCache, SessionPersistence, SessionRecord, SessionSlot, SessionStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CONTEXT_CACHE_CAPACITY: u64 = 1_000;

/// Export/import unit: a session with its full ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub session: Session,
    pub ledger: LedgerExport,
}

/// A turn matched by a ledger search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnMatch {
    pub turn: Turn,
    pub score: u32,
}

/// A generated turn ready to be committed
struct Draft {
    turn: Turn,
    decision: Decision,
}

/// What a successful commit changed
struct Committed {
    turn: Turn,
    from: OrchestrationState,
    to: OrchestrationState,
    current_iteration: u32,
    final_artifact: Option<String>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    generator: Arc<dyn TextGenerator>,
    settings: OrchestrationSettings,
    store: Option<Arc<SessionStore>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
    notifier: Option<Notifier>,
}

impl OrchestratorBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            settings: OrchestrationSettings::default(),
            store: None,
            persistence: None,
            notifier: None,
        }
    }

    pub fn settings(mut self, settings: OrchestrationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn SessionPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.settings.validate()?;

        let cache = ContextCache::new(
            ContextBuilder::with_history_window(self.settings.history_window),
            Duration::from_secs(self.settings.context_cache_ttl_seconds),
            CONTEXT_CACHE_CAPACITY,
        );

        Ok(Orchestrator {
            prompts: PromptManager::new(self.settings.profiles.clone()),
            classifier: DecisionClassifier::new(self.settings.keywords.clone()),
            validator: ResponseValidator::new(),
            quality: QualityAssessor::new(),
            generator: self.generator,
            store: self.store.unwrap_or_default(),
            persistence: self.persistence,
            notifier: self.notifier.unwrap_or_default(),
            cache,
            settings: self.settings,
        })
    }
}

/// Drives sessions through the PM → Developer → Team Lead review loop
pub struct Orchestrator {
    settings: OrchestrationSettings,
    generator: Arc<dyn TextGenerator>,
    store: Arc<SessionStore>,
    cache: ContextCache,
    persistence: Option<Arc<dyn SessionPersistence>>,
    notifier: Notifier,
    prompts: PromptManager,
    classifier: DecisionClassifier,
    validator: ResponseValidator,
    quality: QualityAssessor,
}

impl Orchestrator {
    pub fn builder(generator: Arc<dyn TextGenerator>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(generator)
    }

    pub fn settings(&self) -> &OrchestrationSettings {
        &self.settings
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Start a session with the configured budgets
    pub async fn start_with_defaults(&self, requirements: &str) -> Result<SessionSummary> {
        self.start(
            requirements,
            self.settings.max_iterations,
            self.settings.max_interventions,
        )
        .await
    }

    /// Create a session and run the first Product Manager turn
    pub async fn start(
        &self,
        requirements: &str,
        max_iterations: u32,
        max_interventions: u32,
    ) -> Result<SessionSummary> {
        let mut session = Session::new(requirements, max_iterations, max_interventions)?;
        session.transition_to(OrchestrationState::RequirementsAnalysis)?;
        let session_id = session.id;
        info!(
            "Starting session {} (max_iterations={}, max_interventions={})",
            session_id, max_iterations, max_interventions
        );

        let slot = self
            .store
            .insert(SessionRecord::new(session))
            .ok_or_else(|| {
                Error::Internal(anyhow::anyhow!("Session {} already exists", session_id))
            })?;
        let _gate = slot.lock().await;

        self.notifier.publish(SessionEvent::StateChanged {
            session_id,
            from: OrchestrationState::Initializing,
            to: OrchestrationState::RequirementsAnalysis,
            current_iteration: 0,
        });
        if !self.persist(&slot).await {
            return Ok(Self::settled_summary(&slot));
        }

        self.run_turn(&slot).await?;
        Ok(Self::settled_summary(&slot))
    }

    /// Run exactly one agent turn, optionally after accepting user input
    pub async fn advance(
        &self,
        session_id: Uuid,
        user_input: Option<String>,
    ) -> Result<SessionSummary> {
        debug!("Advancing session {}", session_id);
        let slot = self.slot(session_id).await?;
        let _gate = slot.lock().await;

        if slot.cancel_requested() {
            return Err(CoreError::invalid_transition(format!(
                "Session {} has been cancelled",
                session_id
            ))
            .into());
        }
        slot.read().session.ensure_mutable()?;

        if let Some(text) = user_input {
            self.accept_intervention(&slot, text).await?;
            if slot.read().session.is_terminal() {
                return Ok(Self::settled_summary(&slot));
            }
        }

        self.run_turn(&slot).await?;
        Ok(Self::settled_summary(&slot))
    }

    /// Current summary; never mutates the session
    pub async fn status(&self, session_id: Uuid) -> Result<SessionSummary> {
        let slot = self.slot(session_id).await?;
        Ok(slot.summary())
    }

    /// Mark a session cancelled. In-flight results are discarded.
    pub async fn cancel(&self, session_id: Uuid) -> Result<SessionSummary> {
        let slot = self.slot(session_id).await?;
        {
            let record = slot.read();
            if record.session.is_terminal() {
                return Err(CoreError::invalid_transition(format!(
                    "Session {} is {} and cannot be cancelled",
                    session_id, record.session.state
                ))
                .into());
            }
            if record.session.cancelled {
                debug!("Session {} is already cancelled", session_id);
                return Ok(record.session.summary(&record.ledger, slot.is_busy()));
            }
        }

        slot.request_cancel();
        slot.write().session.cancel();
        info!("Cancelled session {}", session_id);

        self.cache.invalidate(session_id).await;
        self.notifier.publish(SessionEvent::Cancelled { session_id });
        self.persist(&slot).await;
        Ok(slot.summary())
    }

    /// Full session state and ledger
    pub async fn export(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        let slot = self.slot(session_id).await?;
        let record = slot.snapshot();
        Ok(SessionSnapshot {
            session: record.session,
            ledger: record.ledger.export(),
        })
    }

    /// Restore a session from a snapshot, replacing any loaded copy
    pub async fn import(&self, snapshot: SessionSnapshot) -> Result<SessionSummary> {
        let SessionSnapshot { session, ledger } = snapshot;
        if session.id != ledger.session_id {
            return Err(CoreError::validation(format!(
                "Snapshot ledger belongs to session {}, not {}",
                ledger.session_id, session.id
            ))
            .into());
        }
        session.validate_invariants()?;
        let session_id = session.id;
        let ledger = ConversationLedger::import(ledger)?;
        session.validate_outputs(&ledger)?;
        info!(
            "Importing session {} ({} turns, state {})",
            session_id,
            ledger.len(),
            session.state
        );

        let record = SessionRecord { session, ledger };
        let slot = loop {
            if let Some(slot) = self.store.get(session_id) {
                // Advances already queued on this slot run against the
                // imported record once the gate is released
                let _gate = slot.lock().await;
                slot.replace(record);
                self.cache.invalidate(session_id).await;
                self.persist(&slot).await;
                return Ok(Self::settled_summary(&slot));
            }
            match self.store.insert(record.clone()) {
                Some(slot) => break slot,
                None => debug!("Session {} appeared during import, replacing it", session_id),
            }
        };

        let _gate = slot.lock().await;
        self.cache.invalidate(session_id).await;
        self.persist(&slot).await;
        Ok(Self::settled_summary(&slot))
    }

    /// Summaries of every known session, most recently active first
    pub async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = self.store.summaries();

        if let Some(persistence) = &self.persistence {
            for session in persistence.list().await? {
                if self.store.contains(session.id) {
                    continue;
                }
                if let Some((session, ledger)) = persistence.load(session.id).await? {
                    summaries.push(session.summary(&ledger, false));
                }
            }
        }

        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    /// Turns matching `filter`, in sequence order
    pub async fn turns(&self, session_id: Uuid, filter: &TurnFilter) -> Result<Vec<Turn>> {
        let slot = self.slot(session_id).await?;
        let record = slot.read();
        Ok(record.ledger.query(filter).into_iter().cloned().collect())
    }

    /// Keyword search over a session's ledger
    pub async fn search(&self, session_id: Uuid, query: &str) -> Result<Vec<TurnMatch>> {
        let slot = self.slot(session_id).await?;
        let record = slot.read();
        Ok(record
            .ledger
            .search(query)
            .into_iter()
            .map(|hit| TurnMatch {
                turn: hit.turn.clone(),
                score: hit.score,
            })
            .collect())
    }

    /// Correct a turn's content, keeping the edit trail
    pub async fn edit_turn(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        content: String,
        reason: Option<String>,
    ) -> Result<Turn> {
        let slot = self.slot(session_id).await?;
        let _gate = slot.lock().await;

        let edited = {
            let mut record = slot.write();
            let SessionRecord { session, ledger } = &mut *record;
            session.ensure_mutable()?;
            ledger.edit(turn_id, content, reason)?;
            let turn = ledger
                .get(turn_id)
                .cloned()
                .ok_or_else(|| CoreError::turn_not_found(turn_id))?;
            if let Some(output) = turn
                .role
                .and_then(|role| session.per_agent_outputs.get_mut(&role))
            {
                if output.turn_id == turn_id {
                    output.content = turn.content.clone();
                }
            }
            turn
        };
        info!("Edited turn {} in session {}", turn_id, session_id);

        self.cache.invalidate(session_id).await;
        self.persist(&slot).await;
        Ok(edited)
    }

    /// Remove a turn; children are refused unless `cascade` is set
    pub async fn delete_turn(
        &self,
        session_id: Uuid,
        turn_id: Uuid,
        cascade: bool,
    ) -> Result<Vec<Uuid>> {
        let slot = self.slot(session_id).await?;
        let _gate = slot.lock().await;

        let removed = {
            let mut record = slot.write();
            let SessionRecord { session, ledger } = &mut *record;
            session.ensure_mutable()?;
            let removed = ledger.delete(turn_id, cascade)?;

            for role in AgentRole::ALL {
                let stale = session
                    .per_agent_outputs
                    .get(&role)
                    .map_or(false, |output| removed.contains(&output.turn_id));
                if stale {
                    match ledger.latest_by_role(role) {
                        Some(turn) => {
                            session.per_agent_outputs.insert(role, AgentOutput::from(turn));
                        }
                        None => {
                            session.per_agent_outputs.remove(&role);
                        }
                    }
                }
            }
            removed
        };
        info!(
            "Deleted {} turn(s) from session {}",
            removed.len(),
            session_id
        );

        self.cache.invalidate(session_id).await;
        self.persist(&slot).await;
        Ok(removed)
    }

    async fn slot(&self, session_id: Uuid) -> Result<Arc<SessionSlot>> {
        if let Some(slot) = self.store.get(session_id) {
            return Ok(slot);
        }

        let persistence = self
            .persistence
            .as_ref()
            .ok_or_else(|| CoreError::session_not_found(session_id))?;
        let (session, ledger) = persistence
            .load(session_id)
            .await?
            .ok_or_else(|| CoreError::session_not_found(session_id))?;
        debug!("Loaded session {} from storage", session_id);

        let cancelled = session.cancelled;
        match self.store.insert(SessionRecord { session, ledger }) {
            Some(slot) => {
                if cancelled {
                    slot.request_cancel();
                }
                Ok(slot)
            }
            None => self
                .store
                .get(session_id)
                .ok_or_else(|| CoreError::session_not_found(session_id).into()),
        }
    }

    fn settled_summary(slot: &SessionSlot) -> SessionSummary {
        let record = slot.read();
        record.session.summary(&record.ledger, false)
    }

    async fn accept_intervention(&self, slot: &SessionSlot, text: String) -> Result<()> {
        let turn = {
            let mut record = slot.write();
            let SessionRecord { session, ledger } = &mut *record;
            let turn = Turn::user_input(session.id, text.as_str())?;
            session.record_intervention(text)?;
            let sequence = ledger.append(turn)?;
            info!(
                "Accepted user input for session {} ({}/{})",
                session.id, session.user_intervention_count, session.max_interventions
            );
            ledger
                .get_by_sequence(sequence)
                .cloned()
                .ok_or_else(|| CoreError::Internal(format!("Turn #{} vanished", sequence)))?
        };

        self.cache.invalidate(turn.session_id).await;
        self.notifier.publish(SessionEvent::turn_recorded(&turn));
        self.persist(slot).await;
        Ok(())
    }

    async fn run_turn(&self, slot: &SessionSlot) -> Result<()> {
        if slot.cancel_requested() {
            return Err(CoreError::invalid_transition("Session has been cancelled").into());
        }

        let record = slot.snapshot();
        let session_id = record.session.id;
        let context = self.cache.get_or_build(&record.session, &record.ledger).await;
        let role = select_agent(context.state, context.latest_feedback()).ok_or_else(|| {
            CoreError::invalid_transition(format!("No agent acts in state {}", context.state))
        })?;
        let mode = if context.state == OrchestrationState::FinalApproval {
            AgentMode::FinalApproval
        } else {
            AgentMode::select(role, &context)
        };

        let request = self.prompts.build_request(mode, &context)?;
        debug!(
            "Invoking {} ({}) for session {} in state {}",
            role.display_name(),
            mode.as_str(),
            session_id,
            context.state
        );
        let outcome =
            generate_with_retry(self.generator.as_ref(), &request, &self.settings.retry).await;

        if slot.cancel_requested() {
            info!(
                "Discarding {} output for cancelled session {}",
                role.display_name(),
                session_id
            );
            return Ok(());
        }

        let draft = outcome.and_then(|text| self.evaluate(role, mode, &context, text));
        match draft {
            Ok(draft) => {
                if let Some(committed) = self.commit(slot, role, draft)? {
                    self.announce(session_id, committed);
                    self.cache.invalidate(session_id).await;
                    self.persist(slot).await;
                }
            }
            Err(err) => {
                error!(
                    "{} turn failed for session {}: {}",
                    role.display_name(),
                    session_id,
                    err
                );
                if let Some(turn) = self.commit_failure(slot, role, &err)? {
                    self.notifier.publish(SessionEvent::turn_recorded(&turn));
                    self.cache.invalidate(session_id).await;
                    self.persist(slot).await;
                }
            }
        }
        Ok(())
    }

    /// Classify, validate and score a raw response
    fn evaluate(
        &self,
        role: AgentRole,
        mode: AgentMode,
        context: &AgentContext,
        text: String,
    ) -> promptsmith_core::Result<Draft> {
        let mut flags = Vec::new();
        let (category, decision) = match role {
            AgentRole::ProductManager => {
                let category = if asks_clarification(&text) && context.can_request_input() {
                    MessageCategory::Clarification
                } else {
                    MessageCategory::Requirement
                };
                (category, category.decision())
            }
            AgentRole::Developer => (MessageCategory::TechnicalSolution, Decision::Review),
            AgentRole::TeamLead => {
                let decision = self.review_decision(&text, context, &mut flags);
                (MessageCategory::from(decision), decision)
            }
        };

        let validation = self.validator.validate(&text, role, category, context);
        if validation.has_severity(Severity::Critical) {
            let codes: Vec<&str> = validation
                .issues
                .iter()
                .filter(|issue| issue.severity == Severity::Critical)
                .map(|issue| issue.code.as_str())
                .collect();
            return Err(CoreError::validation_failure(format!(
                "{} response rejected: {}",
                role.display_name(),
                codes.join(", ")
            )));
        }
        if !validation.is_valid {
            warn!(
                "{} response for session {} has validation errors (confidence {:.2})",
                role.display_name(),
                context.session_id,
                validation.confidence
            );
        }

        let quality = self.quality.assess(&text, role, category, context);
        let questions = extract_feedback_questions(decision, &text);

        let mut builder = Turn::builder()
            .session_id(context.session_id)
            .role(role)
            .category(category)
            .confidence(validation.confidence)
            .metadata("mode", json!(mode.as_str()))
            .metadata("generator", json!(self.generator.name()))
            .metadata("is_valid", json!(validation.is_valid))
            .metadata("quality", json!(quality));
        if role == AgentRole::TeamLead {
            builder = builder.metadata("decision", json!(decision));
        }
        if !questions.is_empty() {
            builder = builder.metadata("feedback_questions", json!(questions));
        }
        if let Some(corrected) = &validation.corrected_text {
            builder = builder.metadata("corrected_text", json!(corrected));
        }
        for flag in flags {
            builder = builder.metadata(flag, json!(true));
        }

        let turn = builder.issues(validation.issues).content(text).build()?;
        Ok(Draft { turn, decision })
    }

    /// Team Lead verdict, with the budget overrides applied
    fn review_decision(
        &self,
        text: &str,
        context: &AgentContext,
        flags: &mut Vec<&'static str>,
    ) -> Decision {
        let mut decision = if context.state == OrchestrationState::FinalApproval {
            self.classifier.classify_final(text)
        } else {
            self.classifier
                .decide(text, context.current_iteration, context.max_iterations)
        };

        if decision == Decision::Question && !context.can_request_input() {
            decision = self.classifier.classify_final(text);
            flags.push("intervention_budget_exhausted");
        }
        if decision == Decision::Rejection && context.current_iteration >= context.max_iterations {
            decision = Decision::Approval;
            flags.push("budget_exceeded");
        }
        if DecisionClassifier::is_final_round(context.current_iteration, context.max_iterations) {
            flags.push("forced_convergence");
        }
        decision
    }

    fn commit(&self, slot: &SessionSlot, role: AgentRole, draft: Draft) -> Result<Option<Committed>> {
        let mut record = slot.write();
        if slot.cancel_requested() || record.session.cancelled {
            return Ok(None);
        }
        let SessionRecord { session, ledger } = &mut *record;
        session.ensure_mutable()?;

        let Draft { mut turn, decision } = draft;
        let parent_role = match role {
            AgentRole::TeamLead => AgentRole::Developer,
            AgentRole::ProductManager | AgentRole::Developer => AgentRole::TeamLead,
        };
        turn.parent_id = ledger.latest_by_role(parent_role).map(|parent| parent.id);

        let from = session.state;
        let sequence = ledger.append(turn)?;
        let turn = ledger
            .get_by_sequence(sequence)
            .cloned()
            .ok_or_else(|| CoreError::Internal(format!("Turn #{} vanished", sequence)))?;
        session.record_output(&turn)?;

        if role == AgentRole::TeamLead
            && matches!(decision, Decision::Approval | Decision::Rejection)
        {
            session.advance_iteration()?;
        }

        let to = next_state(
            from,
            decision,
            session.current_iteration,
            session.max_iterations,
        );
        let final_artifact = if to == OrchestrationState::Completed {
            let artifact = extractor::extract(&turn.content);
            session.complete(artifact.clone())?;
            Some(artifact)
        } else {
            if to != from {
                session.transition_to(to)?;
            }
            None
        };

        Ok(Some(Committed {
            turn,
            from,
            to: session.state,
            current_iteration: session.current_iteration,
            final_artifact,
        }))
    }

    fn commit_failure(
        &self,
        slot: &SessionSlot,
        role: AgentRole,
        err: &CoreError,
    ) -> Result<Option<Turn>> {
        let mut record = slot.write();
        if slot.cancel_requested() || record.session.cancelled {
            return Ok(None);
        }
        let SessionRecord { session, ledger } = &mut *record;
        session.ensure_mutable()?;

        let sequence = ledger.append(Turn::failure(session.id, role, err))?;
        session.record_failure(err.to_string());
        Ok(ledger.get_by_sequence(sequence).cloned())
    }

    fn announce(&self, session_id: Uuid, committed: Committed) {
        self.notifier
            .publish(SessionEvent::turn_recorded(&committed.turn));

        if committed.from != committed.to {
            info!(
                "Session {} moved {} -> {} (iteration {})",
                session_id, committed.from, committed.to, committed.current_iteration
            );
            self.notifier.publish(SessionEvent::StateChanged {
                session_id,
                from: committed.from,
                to: committed.to,
                current_iteration: committed.current_iteration,
            });
        }
        if let Some(final_artifact) = committed.final_artifact {
            info!("Session {} completed", session_id);
            self.notifier.publish(SessionEvent::Completed {
                session_id,
                final_artifact,
            });
        }
    }

    /// Save the slot's current state. A failed save fails the session.
    async fn persist(&self, slot: &SessionSlot) -> bool {
        let Some(persistence) = &self.persistence else {
            return true;
        };

        let record = slot.snapshot();
        let session_id = record.session.id;
        match persistence.save(&record.session, &record.ledger).await {
            Ok(()) => true,
            Err(e) => {
                let message = format!("persistence failure: {}", e);
                error!("Failed to save session {}: {}", session_id, e);
                let failed = {
                    let mut record = slot.write();
                    record.session.fail(message.clone());
                    record.session.state == OrchestrationState::Failed
                };
                self.cache.invalidate(session_id).await;
                if failed {
                    self.notifier.publish(SessionEvent::Failed {
                        session_id,
                        error: message,
                    });
                }
                false
            }
        }
    }
}

/// A Product Manager turn that asks the user before writing requirements
fn asks_clarification(text: &str) -> bool {
    text.contains('?') && text.to_lowercase().contains("clarifying question")
}
