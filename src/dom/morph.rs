//! Structural patching: mutate a live node so it resembles a target.
//!
//! [`Patch`] is the seam for the structural patch primitive. [`Morph`] is the
//! built-in implementation: it works in place, keeps node identity wherever
//! the shapes allow it, and consults a removal veto before discarding nodes.
//!
//! Alignment of children is positional. Live children whose removal would be
//! vetoed (sentinels) are stepped over rather than overwritten, new children
//! are inserted after the last aligned child, and surplus children are
//! removed unless vetoed.

use super::node::NodeRef;
use super::parse::parse_fragment;
use thiserror::Error;

/// How much of the live tree a patch may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchScope {
    /// Morph the children of the live node to match the target's content.
    WholeSubtree,
    /// Morph the live node itself (and its subtree) into the target node.
    SingleNode,
}

/// What the live node should end up resembling.
#[derive(Debug, Clone, Copy)]
pub enum PatchTarget<'a> {
    /// A markup fragment.
    Markup(&'a str),
    /// A detached node.
    Node(&'a NodeRef),
}

/// Options for a single patch call.
pub struct PatchOptions<'a> {
    /// Scope of the patch.
    pub scope: PatchScope,
    /// Called before a node is removed. Returning `false` vetoes the removal.
    pub on_before_remove: &'a dyn Fn(&NodeRef) -> bool,
}

impl<'a> PatchOptions<'a> {
    /// Create options with the given scope and removal veto.
    pub fn new(scope: PatchScope, on_before_remove: &'a dyn Fn(&NodeRef) -> bool) -> Self {
        Self {
            scope,
            on_before_remove,
        }
    }

    fn may_remove(&self, node: &NodeRef) -> bool {
        (self.on_before_remove)(node)
    }
}

impl std::fmt::Debug for PatchOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchOptions")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Errors raised by a patch primitive.
///
/// A failed patch may leave the live tree partially updated; recovery (for
/// example a full rebuild) is up to the host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Whole-subtree patching needs an element to hold the children.
    #[error("cannot patch children of a non-element node")]
    NotAContainer,
    /// Single-node patching was given markup without any node in it.
    #[error("patch target markup contains no nodes")]
    EmptyTarget,
    /// An external patch implementation refused or failed.
    #[error("patch rejected: {0}")]
    Rejected(String),
}

/// The structural patch primitive.
pub trait Patch {
    /// Mutate `live` to resemble `target` within `options.scope`.
    fn patch(
        &mut self,
        live: &NodeRef,
        target: PatchTarget<'_>,
        options: &PatchOptions<'_>,
    ) -> Result<(), PatchError>;
}

impl<P: Patch + ?Sized> Patch for &mut P {
    fn patch(
        &mut self,
        live: &NodeRef,
        target: PatchTarget<'_>,
        options: &PatchOptions<'_>,
    ) -> Result<(), PatchError> {
        (**self).patch(live, target, options)
    }
}

/// Statistics of the mutations performed by [`Morph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MorphStats {
    /// Nodes whose text, attributes or kind changed.
    pub nodes_changed: usize,
    /// Nodes inserted.
    pub nodes_inserted: usize,
    /// Nodes removed.
    pub nodes_removed: usize,
    /// Removals vetoed by the callback.
    pub removals_vetoed: usize,
}

/// In-place morphing patch primitive.
#[derive(Debug, Default)]
pub struct Morph {
    stats: MorphStats,
}

impl Morph {
    /// Create a new morph patcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutation counters accumulated since creation or the last reset.
    pub const fn stats(&self) -> MorphStats {
        self.stats
    }

    /// Reset the mutation counters.
    pub fn reset_stats(&mut self) {
        self.stats = MorphStats::default();
    }

    /// Morph `live` into `target`, keeping `live`'s identity.
    fn morph_node(&mut self, live: &NodeRef, target: &NodeRef, options: &PatchOptions<'_>) {
        let target_kind = target.kind().clone();
        let same_shape = live.kind().same_shape(&target_kind);

        if same_shape {
            let changed = *live.kind() != target_kind;
            if changed {
                live.set_kind(target_kind);
                self.stats.nodes_changed += 1;
            }
        } else {
            // Rewrite in place: the node becomes a different kind of node.
            live.set_kind(target_kind);
            self.stats.nodes_changed += 1;
        }
        self.morph_children(live, &target.children(), options);
    }

    /// Align `live`'s children with `targets` positionally.
    fn morph_children(&mut self, live: &NodeRef, targets: &[NodeRef], options: &PatchOptions<'_>) {
        let mut cursor = 0;
        for target in targets {
            // Step over protected live nodes.
            let mut probe = cursor;
            while let Some(child) = live.child(probe) {
                if options.may_remove(&child) {
                    break;
                }
                probe += 1;
            }
            if let Some(child) = live.child(probe) {
                self.morph_node(&child, target, options);
                cursor = probe + 1;
            } else {
                // Insert ahead of any trailing protected run.
                live.insert_child(cursor, target.deep_clone());
                self.stats.nodes_inserted += 1;
                cursor += 1;
            }
        }

        // Surplus nodes, last first so indices stay valid.
        let mut index = live.child_count();
        while index > cursor {
            index -= 1;
            let Some(child) = live.child(index) else {
                continue;
            };
            if options.may_remove(&child) {
                live.remove_child(index);
                self.stats.nodes_removed += 1;
            } else {
                self.stats.removals_vetoed += 1;
            }
        }
    }
}

impl Patch for Morph {
    fn patch(
        &mut self,
        live: &NodeRef,
        target: PatchTarget<'_>,
        options: &PatchOptions<'_>,
    ) -> Result<(), PatchError> {
        match (options.scope, target) {
            (PatchScope::WholeSubtree, target) => {
                if !live.is_element() {
                    return Err(PatchError::NotAContainer);
                }
                let targets = match target {
                    PatchTarget::Markup(markup) => parse_fragment(markup),
                    PatchTarget::Node(node) => node.children(),
                };
                self.morph_children(live, &targets, options);
            }
            (PatchScope::SingleNode, _) if !options.may_remove(live) => {
                // Protected nodes are never rewritten.
            }
            (PatchScope::SingleNode, PatchTarget::Markup(markup)) => {
                let first = parse_fragment(markup)
                    .into_iter()
                    .next()
                    .ok_or(PatchError::EmptyTarget)?;
                self.morph_node(live, &first, options);
            }
            (PatchScope::SingleNode, PatchTarget::Node(node)) => {
                self.morph_node(live, node, options);
            }
        }
        Ok(())
    }
}
