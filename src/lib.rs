//! # Stream Morph
//!
//! Incremental rendering of a continuously growing text stream into a live
//! node tree, for chat-style interfaces that display model output as it
//! arrives.
//!
//! ## Core Concepts
//!
//! - **Hash-skip reconciliation**: unchanged markup, whole or per top-level
//!   block, is never re-patched
//! - **In-place morphing**: patched nodes keep their identity, and sentinel
//!   nodes flagged as ignored are never removed
//! - **Partitioned caches**: one memory budget split across render and
//!   sub-render LRU partitions
//! - **Adaptive pacing**: the update interval follows measured patch cost
//!
//! ## Example
//!
//! ```rust
//! use std::time::Instant;
//! use stream_morph::{NodeRef, StreamView, ViewConfig};
//!
//! let container = NodeRef::element("div");
//! let mut view = StreamView::new(container.clone(), ViewConfig::default())?;
//!
//! let now = Instant::now();
//! view.start_session(now);
//! view.push("# Hello\n\nwor", now)?;
//! view.push("ld", now)?;
//! view.end_session(now)?;
//!
//! assert_eq!(container.inner_markup(), "<h1>Hello</h1><p>world</p>");
//! # Ok::<(), stream_morph::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cache;
pub mod dom;
pub mod error;
pub mod pacing;
pub mod reconcile;
pub mod view;

// Re-exports for convenience
pub use cache::{CacheConfig, CacheManager, CacheStats, LruCache, Partition};
pub use dom::{parse_fragment, Morph, NodeFlags, NodeId, NodeRef, Patch, PatchError, PatchScope};
pub use error::{Error, Result};
pub use pacing::{Offer, PacingConfig, PacingController, RefreshTicker, Throttle, TickerConfig};
pub use reconcile::{hash, ContentHash, ReconcileStats, Reconciler};
pub use view::{ApplyMode, ContentRenderer, PlainRenderer, RenderStrategy, StreamView, ViewConfig};
