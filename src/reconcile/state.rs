//! Per-container reconciliation state.
//!
//! State is keyed by the container's [`NodeId`] and remembers the container
//! only weakly, so dropping a container is enough to retire its state. Dead
//! entries are pruned automatically whenever the table doubles past its
//! last pruned size.

use super::hash::ContentHash;
use crate::dom::{NodeId, NodeRef, WeakNode};
use std::collections::HashMap;

/// Smallest table size that triggers an automatic prune.
const MIN_PRUNE_WATERMARK: usize = 16;

/// Counters from the last positional reconciliation of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Children patched because their content changed.
    pub updated: usize,
    /// Children left untouched because their hash matched.
    pub skipped: usize,
    /// Children appended.
    pub added: usize,
    /// Trailing children removed.
    pub removed: usize,
}

impl ReconcileStats {
    /// Check whether the reconciliation mutated the container.
    pub const fn changed(&self) -> bool {
        self.updated + self.added + self.removed > 0
    }

    /// Total number of positions visited.
    pub const fn total(&self) -> usize {
        self.updated + self.skipped + self.added + self.removed
    }
}

/// What the engine remembers about one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileState {
    /// Fingerprint of the last markup applied by a whole-tree patch.
    pub whole_hash: Option<ContentHash>,
    /// Fingerprints of the top-level children not flagged as ignored, in
    /// order, as of the last positional patch.
    pub child_hashes: Vec<ContentHash>,
    /// Counters from the last positional patch.
    pub last_stats: ReconcileStats,
}

#[derive(Debug)]
struct Entry {
    owner: WeakNode,
    state: ReconcileState,
}

/// Weakly keyed table of [`ReconcileState`]s.
#[derive(Debug)]
pub struct StateTable {
    entries: HashMap<NodeId, Entry>,
    prune_watermark: usize,
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            prune_watermark: MIN_PRUNE_WATERMARK,
        }
    }

    /// State for `container`, created on first use.
    pub fn entry(&mut self, container: &NodeRef) -> &mut ReconcileState {
        let id = container.id();
        if !self.entries.contains_key(&id) && self.entries.len() >= self.prune_watermark {
            self.prune();
            self.prune_watermark = (self.entries.len() * 2).max(MIN_PRUNE_WATERMARK);
        }
        &mut self
            .entries
            .entry(id)
            .or_insert_with(|| Entry {
                owner: container.downgrade(),
                state: ReconcileState::default(),
            })
            .state
    }

    /// State for `container`, if any.
    pub fn get(&self, container: &NodeRef) -> Option<&ReconcileState> {
        self.entries.get(&container.id()).map(|e| &e.state)
    }

    /// Discard the state of `container`.
    pub fn remove(&mut self, container: &NodeRef) -> Option<ReconcileState> {
        self.entries.remove(&container.id()).map(|e| e.state)
    }

    /// Discard every state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.prune_watermark = MIN_PRUNE_WATERMARK;
    }

    /// Drop states whose container no longer exists. Returns how many were
    /// dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.owner.is_dead());
        before - self.entries.len()
    }

    /// Number of tracked containers, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
