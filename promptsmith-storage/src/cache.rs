//! TTL cache of built agent contexts
//!
//! Entries are keyed by session id and carry the session revision they were
//! built from. A lookup whose revision differs from the live session rebuilds
//! the context, and writers invalidate the entry explicitly because ledger
//! edits do not bump the session revision.

use moka::future::Cache;
use promptsmith_core::context::{AgentContext, ContextBuilder};
use promptsmith_core::ledger::ConversationLedger;
use promptsmith_core::session::Session;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct ContextCache {
    cache: Cache<Uuid, Arc<AgentContext>>,
    builder: ContextBuilder,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContextCache {
    pub fn new(builder: ContextBuilder, ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            builder,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached context for this session revision, built on a miss
    pub async fn get_or_build(
        &self,
        session: &Session,
        ledger: &ConversationLedger,
    ) -> Arc<AgentContext> {
        if let Some(context) = self.cache.get(&session.id).await {
            if context.revision == session.revision {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return context;
            }
            debug!(
                "Context for session {} is stale (revision {} < {})",
                session.id, context.revision, session.revision
            );
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let context = Arc::new(self.builder.build(session, ledger));
        self.cache.insert(session.id, context.clone()).await;
        context
    }

    pub async fn invalidate(&self, session_id: Uuid) {
        self.cache.invalidate(&session_id).await;
    }

    pub fn builder(&self) -> &ContextBuilder {
        &self.builder
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
