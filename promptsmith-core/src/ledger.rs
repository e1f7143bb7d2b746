//! Conversation ledger
//!
//! The ledger is the append-only, time-ordered record of every turn in one
//! session. It assigns sequence numbers, answers filtered queries, ranks
//! keyword searches and supports the threaded-feedback operations (children,
//! thread, chain). Edits and deletions are explicit operations; edits flag
//! the turn, deletions of turns with children require `cascade`.
//!
//! The ledger itself is not synchronized. Callers serialize access per
//! session (the engine holds it behind the session lock), which is what
//! makes sequence assignment atomic with respect to concurrent appends.
//!
//! # Search scoring
//!
//! Each query token (alphanumeric run longer than three characters, minus a
//! few stop words) found in a turn scores +1; a turn containing the whole
//! query phrase scores a further +2. Results are ordered by score, then by
//! recency.

use crate::agent::AgentRole;
use crate::text;
use crate::turn::{MessageCategory, Turn};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// Filter for [`ConversationLedger::query`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnFilter {
    pub role: Option<AgentRole>,
    pub category: Option<MessageCategory>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

impl TurnFilter {
    pub fn role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn category(mut self, category: MessageCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, turn: &Turn) -> bool {
        self.role.map_or(true, |role| turn.role == Some(role))
            && self.category.map_or(true, |category| turn.category == category)
            && self.since.map_or(true, |since| turn.created_at >= since)
    }
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    pub turn: &'a Turn,
    pub score: u32,
}

/// Aggregate view of a ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSummary {
    pub total_turns: usize,
    pub by_role: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub edited_turns: usize,
    pub failed_turns: usize,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
}

/// Portable form of a ledger, used by export and import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerExport {
    pub session_id: Uuid,
    pub next_sequence: u64,
    pub turns: Vec<Turn>,
}

/// Append-only turn record for one session
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationLedger {
    session_id: Uuid,
    turns: Vec<Turn>,
    next_sequence: u64,
}

impl ConversationLedger {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            turns: Vec::new(),
            next_sequence: 1,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Append a turn, assigning the next sequence number
    pub fn append(&mut self, mut turn: Turn) -> Result<u64> {
        if turn.session_id != self.session_id {
            return Err(Error::validation(format!(
                "Turn belongs to session {}, not {}",
                turn.session_id, self.session_id
            )));
        }
        if self.get(turn.id).is_some() {
            return Err(Error::constraint_violation(
                "unique_turn_id",
                format!("Turn {} is already recorded", turn.id),
            ));
        }
        if let Some(parent_id) = turn.parent_id {
            if self.get(parent_id).is_none() {
                return Err(Error::turn_not_found(parent_id));
            }
        }

        let sequence = self.next_sequence;
        turn.sequence = sequence;
        self.next_sequence += 1;
        debug!(
            "Appending turn {} as #{} to session {}",
            turn.id, sequence, self.session_id
        );
        self.turns.push(turn);
        Ok(sequence)
    }

    pub fn get(&self, id: Uuid) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn get_by_sequence(&self, sequence: u64) -> Option<&Turn> {
        self.turns
            .binary_search_by_key(&sequence, |t| t.sequence)
            .ok()
            .map(|index| &self.turns[index])
    }

    /// Matching turns in sequence order; `limit` keeps the most recent N
    pub fn query(&self, filter: &TurnFilter) -> Vec<&Turn> {
        let matched: Vec<&Turn> = self.turns.iter().filter(|t| filter.matches(t)).collect();
        match filter.limit {
            Some(limit) => matched[matched.len().saturating_sub(limit)..].to_vec(),
            None => matched,
        }
    }

    /// Most recent successful output of `role` (failure turns are skipped)
    pub fn latest_by_role(&self, role: AgentRole) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Some(role) && !t.is_failure())
    }

    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        let phrase = query.trim().to_lowercase();
        if phrase.is_empty() {
            return Vec::new();
        }
        let keywords = text::index_tokens(&phrase);

        let mut hits: Vec<SearchHit<'_>> = self
            .turns
            .iter()
            .filter_map(|turn| {
                let tokens = text::index_tokens(&turn.content);
                let mut score = keywords.iter().filter(|k| tokens.contains(*k)).count() as u32;
                if turn.content.to_lowercase().contains(&phrase) {
                    score += 2;
                }
                (score > 0).then_some(SearchHit { turn, score })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.turn.sequence.cmp(&a.turn.sequence))
        });
        hits
    }

    pub fn children(&self, id: Uuid) -> Vec<&Turn> {
        self.turns
            .iter()
            .filter(|t| t.parent_id == Some(id))
            .collect()
    }

    /// Root turn plus all descendants, in sequence order
    pub fn thread(&self, root: Uuid) -> Result<Vec<&Turn>> {
        if self.get(root).is_none() {
            return Err(Error::turn_not_found(root));
        }
        let ids = self.descendants(root);
        Ok(self
            .turns
            .iter()
            .filter(|t| t.id == root || ids.contains(&t.id))
            .collect())
    }

    /// Ancestors of `id`, root first, ending with the turn itself
    pub fn chain(&self, id: Uuid) -> Result<Vec<&Turn>> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        let mut seen = HashSet::new();

        while let Some(current) = cursor {
            if !seen.insert(current) {
                break;
            }
            let turn = self.get(current).ok_or_else(|| Error::turn_not_found(current))?;
            chain.push(turn);
            cursor = turn.parent_id;
        }

        chain.reverse();
        Ok(chain)
    }

    fn descendants(&self, root: Uuid) -> HashSet<Uuid> {
        let mut found = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                if found.insert(child.id) {
                    queue.push_back(child.id);
                }
            }
        }
        found
    }

    /// Replace a turn's content, flagging it as edited
    pub fn edit<S: Into<String>>(&mut self, id: Uuid, content: S, reason: Option<String>) -> Result<()> {
        let turn = self
            .turns
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::turn_not_found(id))?;
        turn.apply_edit(content, reason)?;
        debug!("Edited turn {} (#{})", id, turn.sequence);
        Ok(())
    }

    /// Delete a turn. Turns with children need `cascade`. Returns removed ids.
    pub fn delete(&mut self, id: Uuid, cascade: bool) -> Result<Vec<Uuid>> {
        if self.get(id).is_none() {
            return Err(Error::turn_not_found(id));
        }

        let descendants = self.descendants(id);
        if !descendants.is_empty() && !cascade {
            return Err(Error::constraint_violation(
                "turn_has_children",
                format!(
                    "Turn {} has {} dependent turn(s); delete with cascade",
                    id,
                    descendants.len()
                ),
            ));
        }

        let mut removed = Vec::with_capacity(descendants.len() + 1);
        self.turns.retain(|t| {
            let drop = t.id == id || descendants.contains(&t.id);
            if drop {
                removed.push(t.id);
            }
            !drop
        });
        debug!("Deleted {} turn(s) from session {}", removed.len(), self.session_id);
        Ok(removed)
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut by_role = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for turn in &self.turns {
            let role = turn.role.map(|r| r.as_str()).unwrap_or("user");
            *by_role.entry(role.to_string()).or_insert(0) += 1;
            *by_category.entry(turn.category.as_str().to_string()).or_insert(0) += 1;
        }

        LedgerSummary {
            total_turns: self.turns.len(),
            by_role,
            by_category,
            edited_turns: self.turns.iter().filter(|t| t.edited).count(),
            failed_turns: self.turns.iter().filter(|t| t.is_failure()).count(),
            first_at: self.turns.first().map(|t| t.created_at),
            last_at: self.turns.last().map(|t| t.created_at),
        }
    }

    pub fn export(&self) -> LedgerExport {
        LedgerExport {
            session_id: self.session_id,
            next_sequence: self.next_sequence,
            turns: self.turns.clone(),
        }
    }

    /// Rebuild a ledger from an export, checking ordering and ownership
    pub fn import(export: LedgerExport) -> Result<Self> {
        let mut last = 0;
        let mut ids = HashSet::new();
        for turn in &export.turns {
            if turn.session_id != export.session_id {
                return Err(Error::validation(format!(
                    "Imported turn {} belongs to another session",
                    turn.id
                )));
            }
            if turn.sequence <= last {
                return Err(Error::constraint_violation(
                    "sequence_order",
                    format!("Turn sequence {} does not follow {}", turn.sequence, last),
                ));
            }
            if !ids.insert(turn.id) {
                return Err(Error::constraint_violation(
                    "unique_turn_id",
                    format!("Turn {} appears twice", turn.id),
                ));
            }
            last = turn.sequence;
        }

        Ok(Self {
            session_id: export.session_id,
            next_sequence: export.next_sequence.max(last + 1),
            turns: export.turns,
        })
    }
}
