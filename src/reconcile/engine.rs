//! Reconciliation engine: decide whether and how to patch a container.
//!
//! Two strategies are offered, chosen by the caller per update:
//!
//! 1. **Whole-tree**: fingerprint the full markup and skip the patch when it
//!    matches the last applied fingerprint. Can be deferred to the next
//!    display refresh, with newer requests replacing older ones.
//! 2. **Positional**: parse the markup into top-level nodes and patch only
//!    the positions whose fingerprint changed, append new positions and drop
//!    surplus ones.
//!
//! Positional comparison is by index, not by key: a reordering shows up as a
//! run of updates.

use super::hash::{hash, ContentHash};
use super::state::{ReconcileState, ReconcileStats, StateTable};
use crate::dom::{
    parse_fragment, Morph, NodeId, NodeRef, Patch, PatchError, PatchOptions, PatchScope,
    PatchTarget, WeakNode,
};
use crate::error::Result;
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

/// Removal veto shared by every patch: sentinel nodes are never removed.
fn keep_ignored(node: &NodeRef) -> bool {
    !node.is_ignored()
}

/// A whole-tree patch waiting for the next frame.
#[derive(Debug)]
struct PendingPatch {
    container: WeakNode,
    markup: String,
    hash: ContentHash,
}

/// Incremental reconciliation engine.
///
/// Generic over the structural patch primitive; [`Morph`] is the default.
/// State for each container is created on first use and dropped when the
/// container is dropped (see [`StateTable`]).
#[derive(Debug)]
pub struct Reconciler<P: Patch = Morph> {
    patcher: P,
    states: StateTable,
    pending: IndexMap<NodeId, PendingPatch>,
}

impl Default for Reconciler<Morph> {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler<Morph> {
    /// Create an engine using the built-in [`Morph`] patcher.
    pub fn new() -> Self {
        Self::with_patcher(Morph::new())
    }
}

impl<P: Patch> Reconciler<P> {
    /// Create an engine around a custom patch primitive.
    pub fn with_patcher(patcher: P) -> Self {
        Self {
            patcher,
            states: StateTable::new(),
            pending: IndexMap::new(),
        }
    }

    /// The patch primitive.
    pub const fn patcher(&self) -> &P {
        &self.patcher
    }

    /// Mutable access to the patch primitive.
    pub fn patcher_mut(&mut self) -> &mut P {
        &mut self.patcher
    }

    /// Patch the container's children to match `markup`, unless `markup` is
    /// identical to what was last applied.
    ///
    /// Supersedes any pending deferred patch for the container. Returns
    /// whether the patch ran.
    pub fn reconcile_whole(&mut self, container: &NodeRef, markup: &str) -> Result<bool> {
        if self.pending.shift_remove(&container.id()).is_some() {
            debug!(container = container.id(), "deferred patch superseded");
        }
        self.apply_whole(container, markup, hash(markup))
    }

    fn apply_whole(&mut self, container: &NodeRef, markup: &str, h: ContentHash) -> Result<bool> {
        let state = self.states.entry(container);
        if state.whole_hash == Some(h) {
            trace!(container = container.id(), hash = %h, "whole-tree patch skipped");
            return Ok(false);
        }

        // Cleared up front so a failed patch is retried on the next call and
        // positional hashes never describe a tree they did not produce.
        state.whole_hash = None;
        state.child_hashes.clear();

        let options = PatchOptions::new(PatchScope::WholeSubtree, &keep_ignored);
        self.patcher
            .patch(container, PatchTarget::Markup(markup), &options)?;

        state.whole_hash = Some(h);
        trace!(container = container.id(), hash = %h, "whole-tree patch applied");
        Ok(true)
    }

    /// Schedule a whole-tree patch for the next [`run_frame`](Self::run_frame).
    ///
    /// Identical content never schedules work and cancels any pending patch
    /// for the container. Otherwise the request replaces whatever was pending
    /// for the container. Returns whether a patch is now pending.
    pub fn reconcile_whole_deferred(&mut self, container: &NodeRef, markup: &str) -> bool {
        let h = hash(markup);
        let id = container.id();

        let applied = self.states.get(container).and_then(|s| s.whole_hash);
        if applied == Some(h) {
            if self.pending.shift_remove(&id).is_some() {
                debug!(container = id, "stale deferred patch cancelled");
            }
            return false;
        }

        let job = PendingPatch {
            container: container.downgrade(),
            markup: markup.to_owned(),
            hash: h,
        };
        if self.pending.insert(id, job).is_some() {
            debug!(container = id, hash = %h, "deferred patch coalesced");
        } else {
            debug!(container = id, hash = %h, "deferred patch scheduled");
        }
        true
    }

    /// Run every pending deferred patch whose container is still alive.
    ///
    /// Call once per display refresh. Returns the number of patches that
    /// mutated a container. All pending patches are attempted; the first
    /// failure is returned afterwards.
    pub fn run_frame(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        let mut applied = 0;
        let mut first_error = None;

        for (id, job) in pending {
            let Some(container) = job.container.upgrade() else {
                trace!(container = id, "deferred patch dropped with its container");
                continue;
            };
            match self.apply_whole(&container, &job.markup, job.hash) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(container = id, error = %err, "deferred patch failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(applied), Err)
    }

    /// Check whether a deferred patch is pending for `container`.
    pub fn has_pending(&self, container: &NodeRef) -> bool {
        self.pending.contains_key(&container.id())
    }

    /// Number of pending deferred patches.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Patch the container's top-level children position by position.
    ///
    /// Positions whose fingerprint matches the last call are left untouched,
    /// changed positions are patched in place, missing positions are appended
    /// and surplus trailing children are removed. Children flagged as ignored
    /// do not occupy a position and are never touched; appended children go
    /// ahead of a trailing run of them. Returns whether anything changed.
    /// On failure the stored child fingerprints stay cleared, so the next
    /// call re-patches every position.
    pub fn reconcile_children(&mut self, container: &NodeRef, markup: &str) -> Result<bool> {
        if self.pending.shift_remove(&container.id()).is_some() {
            debug!(container = container.id(), "deferred patch superseded");
        }

        let targets = parse_fragment(markup);
        let hashes: Vec<ContentHash> = targets.iter().map(|n| hash(&n.outer_markup())).collect();

        let state = self.states.entry(container);
        let previous = std::mem::take(&mut state.child_hashes);

        let result = patch_positions(&mut self.patcher, container, targets, &hashes, &previous);
        let stats = match result {
            Ok(stats) => stats,
            Err(err) => {
                state.whole_hash = None;
                state.last_stats = ReconcileStats::default();
                return Err(err.into());
            }
        };

        let changed = stats.changed();
        if changed {
            state.whole_hash = None;
        }
        state.child_hashes = hashes;
        state.last_stats = stats;

        trace!(
            container = container.id(),
            updated = stats.updated,
            skipped = stats.skipped,
            added = stats.added,
            removed = stats.removed,
            "positional patch"
        );
        Ok(changed)
    }

    /// Counters from the last positional patch of `container` (zeroes if
    /// none).
    pub fn stats(&self, container: &NodeRef) -> ReconcileStats {
        self.states
            .get(container)
            .map(|s| s.last_stats)
            .unwrap_or_default()
    }

    /// Stored state of `container`, if any.
    pub fn state(&self, container: &NodeRef) -> Option<&ReconcileState> {
        self.states.get(container)
    }

    /// Forget state and cancel pending work, for one container or all.
    ///
    /// The next call for an affected container behaves as on a fresh one.
    pub fn reset_state(&mut self, container: Option<&NodeRef>) {
        match container {
            Some(container) => {
                self.states.remove(container);
                self.pending.shift_remove(&container.id());
                debug!(container = container.id(), "reconcile state reset");
            }
            None => {
                self.states.clear();
                self.pending.clear();
                debug!("all reconcile state reset");
            }
        }
    }

    /// Drop state and pending work of containers that no longer exist.
    /// Returns how many states were dropped.
    pub fn prune(&mut self) -> usize {
        self.pending.retain(|_, job| !job.container.is_dead());
        self.states.prune()
    }

    /// Number of containers with stored state.
    pub fn tracked_containers(&self) -> usize {
        self.states.len()
    }
}

fn patch_positions<P: Patch>(
    patcher: &mut P,
    container: &NodeRef,
    targets: Vec<NodeRef>,
    hashes: &[ContentHash],
    previous: &[ContentHash],
) -> std::result::Result<ReconcileStats, PatchError> {
    let mut stats = ReconcileStats::default();
    let options = PatchOptions::new(PatchScope::SingleNode, &keep_ignored);

    // Positions index the removable children only; protected ones are
    // never rewritten, moved or removed.
    let slots: Vec<usize> = container
        .children()
        .iter()
        .enumerate()
        .filter(|&(_, child)| (options.on_before_remove)(child))
        .map(|(index, _)| index)
        .collect();
    let mut insert_at = slots.last().map_or(0, |last| last + 1);

    for (i, (target, h)) in targets.into_iter().zip(hashes).enumerate() {
        match slots.get(i).and_then(|&index| container.child(index)) {
            None => {
                container.insert_child(insert_at, target);
                insert_at += 1;
                stats.added += 1;
            }
            Some(live) if previous.get(i) != Some(h) => {
                patcher.patch(&live, PatchTarget::Node(&target), &options)?;
                stats.updated += 1;
            }
            Some(_) => stats.skipped += 1,
        }
    }

    for &index in slots.iter().skip(hashes.len()).rev() {
        container.remove_child(index);
        stats.removed += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Patcher that always fails.
    struct Refuse;

    impl Patch for Refuse {
        fn patch(
            &mut self,
            _live: &NodeRef,
            _target: PatchTarget<'_>,
            _options: &PatchOptions<'_>,
        ) -> std::result::Result<(), PatchError> {
            Err(PatchError::Rejected("refused".into()))
        }
    }

    fn container() -> NodeRef {
        NodeRef::element("div")
    }

    #[test]
    fn test_positional_appends_into_empty_container() {
        let mut engine = Reconciler::new();
        let c = container();

        assert!(engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap());

        let stats = engine.stats(&c);
        assert_eq!(stats.added, 2);
        assert_eq!(stats.updated + stats.skipped + stats.removed, 0);
        assert_eq!(c.child_count(), 2);
    }

    #[test]
    fn test_positional_identical_markup_skips() {
        let mut engine = Reconciler::new();
        let c = container();
        engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap();
        let before = c.children();

        assert!(!engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap());

        assert_eq!(engine.stats(&c).skipped, 2);
        for (old, new) in before.iter().zip(c.children()) {
            assert!(old.ptr_eq(&new));
        }
    }

    #[test]
    fn test_positional_removes_surplus() {
        let mut engine = Reconciler::new();
        let c = container();
        engine
            .reconcile_children(&c, "<p>A</p><p>B</p><p>C</p>")
            .unwrap();

        assert!(engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap());

        let stats = engine.stats(&c);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(c.child_count(), 2);
    }

    #[test]
    fn test_positional_patches_only_changed_position() {
        let mut engine = Reconciler::new();
        let c = container();
        engine
            .reconcile_children(&c, "<p>A</p><p>B</p><p>C</p>")
            .unwrap();
        let first = c.child(0).unwrap();

        engine
            .reconcile_children(&c, "<p>A</p><p>B2</p><p>C</p>")
            .unwrap();

        let stats = engine.stats(&c);
        assert_eq!((stats.updated, stats.skipped), (1, 2));
        assert!(c.child(0).unwrap().ptr_eq(&first));
        assert_eq!(c.inner_markup(), "<p>A</p><p>B2</p><p>C</p>");
    }

    #[test]
    fn test_positional_shift_counts_as_updates() {
        let mut engine = Reconciler::new();
        let c = container();
        engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap();

        engine
            .reconcile_children(&c, "<p>X</p><p>A</p><p>B</p>")
            .unwrap();

        let stats = engine.stats(&c);
        assert_eq!((stats.updated, stats.added), (2, 1));
        assert_eq!(c.inner_markup(), "<p>X</p><p>A</p><p>B</p>");
    }

    #[test]
    fn test_child_hashes_track_child_count() {
        let mut engine = Reconciler::new();
        let c = container();
        for markup in ["<p>a</p>", "<p>a</p><ul><li>x</li></ul>b", "", "<h1>t</h1>"] {
            engine.reconcile_children(&c, markup).unwrap();
            let state = engine.state(&c).unwrap();
            assert_eq!(state.child_hashes.len(), c.child_count());
        }
    }

    #[test]
    fn test_whole_is_idempotent() {
        let mut engine = Reconciler::new();
        let c = container();

        assert!(engine.reconcile_whole(&c, "<p>A</p>").unwrap());
        let markup = c.inner_markup();
        assert!(!engine.reconcile_whole(&c, "<p>A</p>").unwrap());
        assert_eq!(c.inner_markup(), markup);
        assert!(engine.reconcile_whole(&c, "<p>B</p>").unwrap());
        assert_eq!(c.inner_markup(), "<p>B</p>");
    }

    #[test]
    fn test_whole_keeps_sentinel() {
        let mut engine = Reconciler::new();
        let c = container();
        c.append_child(NodeRef::element("span").ignored());

        engine.reconcile_whole(&c, "<p>A</p><p>B</p>").unwrap();
        engine.reconcile_whole(&c, "").unwrap();

        assert_eq!(c.child_count(), 1);
        assert!(c.child(0).unwrap().is_ignored());
    }

    #[test]
    fn test_positional_steps_over_sentinel() {
        let mut engine = Reconciler::new();
        let c = container();
        c.append_child(
            NodeRef::element("span")
                .with_attr("class", "cursor")
                .ignored(),
        );
        let cursor = "<span class=\"cursor\"></span>";

        engine.reconcile_children(&c, "<p>a</p>").unwrap();
        assert_eq!(c.inner_markup(), format!("<p>a</p>{cursor}"));
        assert_eq!(engine.stats(&c).added, 1);

        engine.reconcile_children(&c, "<p>a</p><p>b</p>").unwrap();
        assert_eq!(c.inner_markup(), format!("<p>a</p><p>b</p>{cursor}"));
        assert_eq!((engine.stats(&c).skipped, engine.stats(&c).added), (1, 1));
        assert_eq!(engine.state(&c).unwrap().child_hashes.len(), 2);

        engine.reconcile_children(&c, "<p>z</p>").unwrap();
        assert_eq!(c.inner_markup(), format!("<p>z</p>{cursor}"));
        assert_eq!((engine.stats(&c).updated, engine.stats(&c).removed), (1, 1));

        engine.reconcile_children(&c, "").unwrap();
        assert_eq!(c.inner_markup(), cursor);
        assert!(c.child(0).unwrap().is_ignored());
    }

    #[test]
    fn test_positional_leaves_leading_sentinel_in_place() {
        let mut engine = Reconciler::new();
        let c = container();
        engine.reconcile_children(&c, "<p>a</p>").unwrap();
        c.insert_child(0, NodeRef::element("hr").ignored());

        engine.reconcile_children(&c, "<p>b</p><p>c</p>").unwrap();

        assert_eq!(c.inner_markup(), "<hr><p>b</p><p>c</p>");
        assert_eq!((engine.stats(&c).updated, engine.stats(&c).added), (1, 1));
    }

    #[test]
    fn test_deferred_coalesces_last_write_wins() {
        let mut engine = Reconciler::new();
        let c = container();

        assert!(engine.reconcile_whole_deferred(&c, "<p>1</p>"));
        assert!(engine.reconcile_whole_deferred(&c, "<p>2</p>"));
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(c.child_count(), 0);

        assert_eq!(engine.run_frame().unwrap(), 1);
        assert_eq!(c.inner_markup(), "<p>2</p>");
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_deferred_identical_content_cancels_stale_pending() {
        let mut engine = Reconciler::new();
        let c = container();
        engine.reconcile_whole(&c, "<p>A</p>").unwrap();

        assert!(engine.reconcile_whole_deferred(&c, "<p>B</p>"));
        assert!(!engine.reconcile_whole_deferred(&c, "<p>A</p>"));
        assert!(!engine.has_pending(&c));

        assert_eq!(engine.run_frame().unwrap(), 0);
        assert_eq!(c.inner_markup(), "<p>A</p>");
    }

    #[test]
    fn test_sync_call_supersedes_deferred() {
        let mut engine = Reconciler::new();
        let c = container();

        engine.reconcile_whole_deferred(&c, "<p>old</p>");
        engine.reconcile_whole(&c, "<p>new</p>").unwrap();

        assert_eq!(engine.run_frame().unwrap(), 0);
        assert_eq!(c.inner_markup(), "<p>new</p>");
    }

    #[test]
    fn test_deferred_skips_dropped_container() {
        let mut engine = Reconciler::new();
        let kept = container();
        {
            let dropped = container();
            engine.reconcile_whole_deferred(&dropped, "<p>x</p>");
        }
        engine.reconcile_whole_deferred(&kept, "<p>y</p>");

        assert_eq!(engine.run_frame().unwrap(), 1);
        assert_eq!(kept.inner_markup(), "<p>y</p>");
    }

    #[test]
    fn test_reset_state_behaves_as_fresh() {
        let mut engine = Reconciler::new();
        let c = container();
        engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap();
        engine.reconcile_whole_deferred(&c, "<p>Z</p>");

        engine.reset_state(Some(&c));

        assert!(engine.state(&c).is_none());
        assert!(!engine.has_pending(&c));
        assert_eq!(engine.stats(&c), ReconcileStats::default());

        // Without stored hashes every existing position is re-patched.
        engine.reconcile_children(&c, "<p>A</p><p>B</p>").unwrap();
        assert_eq!(engine.stats(&c).updated, 2);
    }

    #[test]
    fn test_reset_all_cancels_everything() {
        let mut engine = Reconciler::new();
        let a = container();
        let b = container();
        engine.reconcile_whole_deferred(&a, "<p>a</p>");
        engine.reconcile_whole(&b, "<p>b</p>").unwrap();

        engine.reset_state(None);

        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.tracked_containers(), 0);
        assert!(engine.reconcile_whole(&b, "<p>b</p>").unwrap());
    }

    #[test]
    fn test_mixing_strategies_never_skips_needed_patch() {
        let mut engine = Reconciler::new();
        let c = container();

        engine.reconcile_whole(&c, "<p>A</p>").unwrap();
        engine.reconcile_children(&c, "<p>B</p>").unwrap();
        assert!(engine.reconcile_whole(&c, "<p>A</p>").unwrap());
        assert_eq!(c.inner_markup(), "<p>A</p>");

        assert!(engine.reconcile_children(&c, "<p>B</p>").unwrap());
        assert_eq!(c.inner_markup(), "<p>B</p>");
    }

    #[test]
    fn test_patch_failure_propagates() {
        let mut engine = Reconciler::with_patcher(Refuse);
        let c = container();

        let err = engine.reconcile_whole(&c, "<p>A</p>").unwrap_err();
        assert!(matches!(err, Error::Patch(PatchError::Rejected(_))));
        assert_eq!(engine.state(&c).unwrap().whole_hash, None);

        // Appends do not go through the patcher.
        engine.reconcile_children(&c, "<p>A</p>").unwrap();
        assert!(engine.reconcile_children(&c, "<p>B</p>").is_err());
        assert!(engine.state(&c).unwrap().child_hashes.is_empty());
    }

    #[test]
    fn test_run_frame_reports_first_failure_after_all() {
        let mut engine = Reconciler::with_patcher(Refuse);
        let a = container();
        let b = container();
        engine.reconcile_whole_deferred(&a, "<p>a</p>");
        engine.reconcile_whole_deferred(&b, "<p>b</p>");

        assert!(engine.run_frame().is_err());
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_borrowed_patcher_accumulates_stats() {
        let mut morph = Morph::new();
        {
            let mut engine = Reconciler::with_patcher(&mut morph);
            let c = container();
            engine.reconcile_whole(&c, "<p>A</p><p>B</p>").unwrap();
            engine.reconcile_whole(&c, "<p>A</p>").unwrap();
        }
        assert_eq!(morph.stats().nodes_inserted, 2);
        assert_eq!(morph.stats().nodes_removed, 1);
    }

    #[test]
    fn test_prune_drops_dead_state() {
        let mut engine = Reconciler::new();
        {
            let c = container();
            engine.reconcile_children(&c, "<p>x</p>").unwrap();
        }
        assert_eq!(engine.prune(), 1);
        assert_eq!(engine.tracked_containers(), 0);
    }
}
