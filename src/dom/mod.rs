//! Live tree module: the output tree that reconciliation mutates.
//!
//! This module contains:
//! - [`NodeRef`]: Shared handle to an element, text or comment node
//! - [`parse_fragment`]: Lenient markup parser producing detached nodes
//! - [`Patch`]: The structural patch primitive seam, with [`Morph`] as the
//!   built-in in-place implementation

pub mod morph;
mod node;
mod parse;

pub use morph::{Morph, MorphStats, Patch, PatchError, PatchOptions, PatchScope, PatchTarget};
pub use node::{escape_attr, escape_text, NodeFlags, NodeId, NodeKind, NodeRef, WeakNode};
pub use parse::{decode_entities, parse_fragment};
