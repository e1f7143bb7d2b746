//! In-memory session store
//!
//! Each session lives in its own [`SessionSlot`]. The slot's async `gate`
//! serializes advancing operations for that session only, so different
//! sessions progress in parallel while two advances of the same session run
//! one after the other. The record itself sits behind a short-lived
//! `parking_lot` lock; never hold a record guard across an `.await`.

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use promptsmith_core::ledger::ConversationLedger;
use promptsmith_core::session::{Session, SessionSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// A session and its ledger, always mutated together
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session: Session,
    pub ledger: ConversationLedger,
}

impl SessionRecord {
    pub fn new(session: Session) -> Self {
        let ledger = ConversationLedger::new(session.id);
        Self { session, ledger }
    }
}

/// Per-session slot holding the record and its synchronization
#[derive(Debug)]
pub struct SessionSlot {
    gate: Mutex<()>,
    record: RwLock<SessionRecord>,
    cancel_requested: AtomicBool,
}

impl SessionSlot {
    pub fn new(record: SessionRecord) -> Self {
        let cancelled = record.session.cancelled;
        Self {
            gate: Mutex::new(()),
            record: RwLock::new(record),
            cancel_requested: AtomicBool::new(cancelled),
        }
    }

    /// Wait for exclusive advancing rights on this session
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Whether an advancing operation currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SessionRecord> {
        self.record.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SessionRecord> {
        self.record.write()
    }

    /// Owned copy of the record
    pub fn snapshot(&self) -> SessionRecord {
        self.record.read().clone()
    }

    /// Summary without mutating anything
    pub fn summary(&self) -> SessionSummary {
        let processing = self.is_busy();
        let record = self.record.read();
        record.session.summary(&record.ledger, processing)
    }

    /// Flag the session for cancellation; observed by in-flight advances
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Swap in a whole record, resetting the cancel flag to match it.
    /// Callers hold the gate so no advance observes a half-replaced slot.
    pub fn replace(&self, record: SessionRecord) {
        let cancelled = record.session.cancelled;
        *self.record.write() = record;
        self.cancel_requested.store(cancelled, Ordering::SeqCst);
    }
}

/// Concurrent map of live sessions
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: DashMap<Uuid, Arc<SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record. Returns `None` if the id is already present.
    pub fn insert(&self, record: SessionRecord) -> Option<Arc<SessionSlot>> {
        let id = record.session.id;
        match self.slots.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let slot = Arc::new(SessionSlot::new(record));
                entry.insert(slot.clone());
                debug!("Registered session {}", id);
                Some(slot)
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<SessionSlot>> {
        self.slots.get(&id).map(|slot| slot.value().clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<SessionSlot>> {
        self.slots.remove(&id).map(|(_, slot)| slot)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }

    /// Summaries of every live session, newest first
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let slots: Vec<Arc<SessionSlot>> =
            self.slots.iter().map(|entry| entry.value().clone()).collect();
        let mut records: Vec<(chrono::DateTime<chrono::Utc>, SessionSummary)> = slots
            .iter()
            .map(|slot| {
                let created_at = slot.read().session.created_at;
                (created_at, slot.summary())
            })
            .collect();
        records.sort_by(|a, b| b.0.cmp(&a.0));
        records.into_iter().map(|(_, summary)| summary).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsmith_core::session::SessionStatus;
    use promptsmith_core::turn::Turn;

    fn record(requirements: &str) -> SessionRecord {
        SessionRecord::new(Session::new(requirements, 3, 2).unwrap())
    }

    #[test]
    fn test_insert_rejects_duplicate_ids() {
        let store = SessionStore::new();
        let record = record("Build a note-taking assistant");
        let id = record.session.id;

        assert!(store.insert(record.clone()).is_some());
        assert!(store.insert(record).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.contains(id));
        assert!(store.remove(id).is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_gate_reports_processing() {
        let store = SessionStore::new();
        let slot = store.insert(record("Build a quiz generator")).unwrap();

        assert_eq!(slot.summary().status, SessionStatus::Active);
        let guard = slot.lock().await;
        assert!(slot.is_busy());
        assert_eq!(slot.summary().status, SessionStatus::Processing);
        drop(guard);
        assert!(!slot.is_busy());
    }

    #[test]
    fn test_summary_does_not_mutate() {
        let store = SessionStore::new();
        let slot = store.insert(record("Build a code reviewer")).unwrap();
        {
            let mut record = slot.write();
            let session_id = record.session.id;
            record
                .ledger
                .append(Turn::user_input(session_id, "Focus on Rust").unwrap())
                .unwrap();
        }

        let before = slot.snapshot();
        let first = slot.summary();
        let second = slot.summary();
        assert_eq!(first, second);
        assert_eq!(first.turn_count, 1);
        assert_eq!(slot.snapshot(), before);
    }

    #[test]
    fn test_cancel_flag() {
        let store = SessionStore::new();
        let slot = store.insert(record("Build a haiku writer")).unwrap();
        assert!(!slot.cancel_requested());
        slot.request_cancel();
        assert!(slot.cancel_requested());
    }

    #[test]
    fn test_replace_keeps_the_slot() {
        let store = SessionStore::new();
        let original = record("Build a haiku writer");
        let id = original.session.id;
        let slot = store.insert(original.clone()).unwrap();
        slot.request_cancel();

        let mut restored = original;
        restored.session.revision = 7;
        slot.replace(restored.clone());

        assert!(Arc::ptr_eq(&slot, &store.get(id).unwrap()));
        assert_eq!(slot.snapshot(), restored);
        assert!(!slot.cancel_requested());
    }

    #[test]
    fn test_summaries_newest_first() {
        let store = SessionStore::new();
        let mut older = record("First session");
        older.session.created_at -= chrono::Duration::seconds(60);
        let newer = record("Second session");
        let newer_id = newer.session.id;
        store.insert(older);
        store.insert(newer);

        let summaries = store.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session_id, newer_id);
    }
}
