//! View module: rendering and the streaming host component.
//!
//! This module contains:
//! - [`ContentRenderer`]: Source-to-markup seam, with [`PlainRenderer`]
//! - [`StreamView`]: Throttled render-reconcile-pace loop over one container

mod renderer;
mod stream;

pub use renderer::{ContentRenderer, PlainRenderer, RenderStrategy};
pub use stream::{ApplyMode, SessionSummary, StreamView, ViewConfig};
