//! Scan context - per-conversation mutable state for the matching pipeline.
//!
//! The storage layer's entry rows carry trigger counters that the original
//! design mutated in place on every match. Here those counters are
//! conversation-scoped: a [`ScanContext`] owns them, the engine updates them
//! during a scan, and the caller reads them back afterwards to persist
//! `lastTriggeredAt`-style metadata. Owning the context mutably also
//! serializes scans for the same conversation by construction.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use lorebook::{EntryId, WorldInfoEntry};

/// Activation bookkeeping for a single entry within one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Total activations this conversation.
    pub count: u32,
    /// Turn of the most recent activation.
    pub last_turn: u64,
}

/// Turn-scoped state for one conversation's scans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanContext {
    turn: u64,
    records: HashMap<EntryId, ActivationRecord>,
    /// Entries already activated in the current prompt-assembly pass.
    /// Guarantees each entry is injected at most once even when reachable
    /// through multiple recursion paths.
    #[serde(skip)]
    visited: HashSet<EntryId>,
    tokens_spent: usize,
}

impl ScanContext {
    /// Create a fresh context for a new conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next conversation turn, returning its number.
    ///
    /// Turn numbers start at 1; a context that has never seen `begin_turn`
    /// is at turn 0 and scans still work (cooldowns just have nothing to
    /// measure against).
    pub fn begin_turn(&mut self) -> u64 {
        self.turn += 1;
        self.turn
    }

    /// The current turn number.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Reset per-pass state. Called by the engine at the start of every
    /// prompt-assembly pass.
    pub fn begin_pass(&mut self) {
        self.visited.clear();
        self.tokens_spent = 0;
    }

    /// Whether the entry already activated in this pass.
    pub fn is_visited(&self, id: EntryId) -> bool {
        self.visited.contains(&id)
    }

    /// Lifecycle gate: eligible -> activated -> cooldown/limit-exhausted ->
    /// eligible again (on cooldown expiry) or permanently suppressed
    /// (`trigger_once` already fired).
    pub fn is_eligible(&self, entry: &WorldInfoEntry) -> bool {
        if !entry.is_active {
            return false;
        }

        let Some(record) = self.records.get(&entry.id) else {
            return true;
        };

        if entry.trigger_once && record.count > 0 {
            return false;
        }
        if let Some(limit) = entry.repeat_limit {
            if record.count >= limit {
                return false;
            }
        }
        // Cooldown of k turns suppresses the entry for the k turns after
        // the one it last fired in.
        if entry.cooldown > 0 && self.turn <= record.last_turn + u64::from(entry.cooldown) {
            return false;
        }

        true
    }

    /// Record an activation: bump the counter, stamp the turn, and mark the
    /// entry visited for the rest of this pass.
    pub fn record_activation(&mut self, id: EntryId) {
        let record = self.records.entry(id).or_insert(ActivationRecord {
            count: 0,
            last_turn: 0,
        });
        record.count += 1;
        record.last_turn = self.turn;
        self.visited.insert(id);
    }

    /// Total activations of an entry this conversation.
    pub fn trigger_count(&self, id: EntryId) -> u32 {
        self.records.get(&id).map_or(0, |r| r.count)
    }

    /// Turn of an entry's most recent activation, if it ever fired.
    pub fn last_triggered_turn(&self, id: EntryId) -> Option<u64> {
        self.records.get(&id).map(|r| r.last_turn)
    }

    /// Iterate over all activation records, for the storage layer to write
    /// trigger metadata back.
    pub fn activation_records(&self) -> impl Iterator<Item = (EntryId, &ActivationRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Estimated tokens injected by the most recent pass.
    pub fn tokens_spent(&self) -> usize {
        self.tokens_spent
    }

    pub(crate) fn set_tokens_spent(&mut self, tokens: usize) {
        self.tokens_spent = tokens;
    }
}
