//! Pacing module: how often the live tree is patched.
//!
//! This module contains:
//! - [`PacingController`]: Adapts the update interval to measured patch cost
//! - [`Throttle`]: Single-slot, last-write-wins gate driven by frame callbacks
//! - [`RefreshTicker`]: Background thread emitting display-refresh ticks

mod controller;
mod throttle;
mod ticker;

pub use controller::{PacingConfig, PacingController};
pub use throttle::{Offer, Throttle};
pub use ticker::{RefreshTick, RefreshTicker, TickerConfig};
