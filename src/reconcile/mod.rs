//! Reconcile module: decide how little of the live tree has to change.
//!
//! This module contains:
//! - [`hash`](hash::hash): Length-plus-rolling-hash fingerprint of markup
//! - [`StateTable`]: Per-container state, associated weakly with containers
//! - [`Reconciler`]: Whole-tree and positional patch strategies, with a
//!   coalescing per-container queue for deferred whole-tree patches

mod engine;
pub mod hash;
mod state;

pub use engine::Reconciler;
pub use hash::{hash, ContentHash};
pub use state::{ReconcileState, ReconcileStats, StateTable};
