//! Single-slot throttle scheduler.
//!
//! While a session is live, content offered before the current interval has
//! elapsed since the last apply is held back, and a single check is
//! scheduled for the next display refresh. Only the newest held value
//! survives; [`Throttle::on_frame`] releases it. Outside a session every
//! offer applies immediately.
//!
//! Time is supplied by the caller, so the throttle is fully deterministic.

use std::time::{Duration, Instant};

/// Outcome of [`Throttle::offer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer<T> {
    /// Apply this content now.
    Apply(T),
    /// Content held; a check is now scheduled for a later frame.
    Scheduled,
    /// Content replaced the value held by an already scheduled check.
    Coalesced,
}

impl<T> Offer<T> {
    /// The content to apply, if any.
    pub fn into_apply(self) -> Option<T> {
        match self {
            Self::Apply(content) => Some(content),
            Self::Scheduled | Self::Coalesced => None,
        }
    }
}

/// Throttle with a single pending slot, last write wins.
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    interval: Duration,
    last_applied: Option<Instant>,
    pending: Option<T>,
    scheduled: bool,
    live: bool,
    coalesced: u64,
}

impl<T> Throttle<T> {
    /// Create an idle throttle with the given interval.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_applied: None,
            pending: None,
            scheduled: false,
            live: false,
            coalesced: 0,
        }
    }

    /// Offer new content at time `now`.
    pub fn offer(&mut self, now: Instant, content: T) -> Offer<T> {
        if !self.live || self.is_due(now) {
            self.pending = None;
            self.scheduled = false;
            self.last_applied = Some(now);
            return Offer::Apply(content);
        }

        self.pending = Some(content);
        if self.scheduled {
            self.coalesced += 1;
            Offer::Coalesced
        } else {
            self.scheduled = true;
            Offer::Scheduled
        }
    }

    /// Fire the scheduled check at a display refresh.
    ///
    /// Returns the newest held content. Not live, any held content is
    /// dropped.
    pub fn on_frame(&mut self, now: Instant) -> Option<T> {
        if !self.scheduled {
            return None;
        }
        if !self.live {
            self.cancel();
            return None;
        }
        self.scheduled = false;
        let content = self.pending.take()?;
        self.last_applied = Some(now);
        Some(content)
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_applied
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// When the next offer would apply without being held.
    pub fn next_due(&self) -> Option<Instant> {
        self.last_applied.map(|last| last + self.interval)
    }

    /// Enter or leave the live (throttled) state.
    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    /// Check whether offers are throttled.
    pub const fn is_live(&self) -> bool {
        self.live
    }

    /// Change the minimum time between applies.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Minimum time between applies.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Check whether content is held for a later frame.
    pub const fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Drop held content and the scheduled check. Returns the held content.
    pub fn cancel(&mut self) -> Option<T> {
        self.scheduled = false;
        self.pending.take()
    }

    /// Number of offers that replaced already held content.
    pub const fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Forget timing, held content and counters. The live flag is kept.
    pub fn reset(&mut self) {
        self.last_applied = None;
        self.pending = None;
        self.scheduled = false;
        self.coalesced = 0;
    }
}
