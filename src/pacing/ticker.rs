//! Refresh ticker: background thread emitting display-refresh signals.
//!
//! Hosts without their own frame callback can drive
//! [`Reconciler::run_frame`](crate::Reconciler::run_frame) and
//! [`StreamView::on_frame`](crate::StreamView::on_frame) from these ticks.
//! Only tick events cross the channel; tree data stays on the host thread.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// A display-refresh signal.
#[derive(Debug, Clone, Copy)]
pub struct RefreshTick {
    /// Frame number (monotonically increasing).
    pub frame: u64,
    /// When the tick was emitted.
    pub at: Instant,
}

/// Configuration for the refresh ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Ticks buffered before new ones are dropped.
    pub capacity: usize,
    /// Name of the ticker thread.
    pub thread_name: String,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            // ~60 FPS
            interval: Duration::from_micros(16_667),
            capacity: 2,
            thread_name: "stream-morph-refresh".to_owned(),
        }
    }
}

impl TickerConfig {
    /// Set the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check that the interval and capacity are usable.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config("refresh interval must be positive"));
        }
        if self.capacity == 0 {
            return Err(Error::config("tick capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Background refresh ticker.
///
/// Stops when dropped.
pub struct RefreshTicker {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    tick_rx: Receiver<RefreshTick>,
}

impl RefreshTicker {
    /// Spawn a ticker thread.
    pub fn spawn(config: TickerConfig) -> Result<Self> {
        config.validate()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        // Small buffer: a slow host should see fresh ticks, not a backlog.
        let (tick_tx, tick_rx) = bounded(config.capacity);
        let interval = config.interval;

        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || Self::run_loop(&tick_tx, &shutdown_clone, interval))
            .map_err(|e| Error::Spawn(e.to_string()))?;

        debug!(interval_us = interval.as_micros(), "refresh ticker started");
        Ok(Self {
            handle: Some(handle),
            shutdown,
            tick_rx,
        })
    }

    /// The tick receiver, for use with `select!`.
    #[inline]
    pub const fn receiver(&self) -> &Receiver<RefreshTick> {
        &self.tick_rx
    }

    /// Drain queued ticks and return only the newest.
    ///
    /// Missed frames collapse into one: a host that fell behind runs a
    /// single refresh, not a burst.
    pub fn latest(&self) -> Option<RefreshTick> {
        self.tick_rx.try_iter().last()
    }

    /// Block until the next tick or `timeout`, then drain any backlog.
    pub fn wait(&self, timeout: Duration) -> Option<RefreshTick> {
        let first = self.tick_rx.recv_timeout(timeout).ok()?;
        Some(self.latest().unwrap_or(first))
    }

    /// Signal the ticker to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Stop the ticker and wait for its thread.
    pub fn join(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn run_loop(tick_tx: &Sender<RefreshTick>, shutdown: &AtomicBool, interval: Duration) {
        let mut frame = 0u64;
        let mut next_tick = Instant::now() + interval;

        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_tick {
                thread::sleep((next_tick - now).min(Duration::from_millis(1)));
                continue;
            }

            // Full buffer: drop the tick instead of queuing.
            let _ = tick_tx.try_send(RefreshTick { frame, at: now });
            frame += 1;
            next_tick += interval;
            if next_tick < now {
                next_tick = now + interval;
            }
        }
    }
}

impl Drop for RefreshTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RefreshTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTicker")
            .field("running", &!self.shutdown.load(Ordering::Relaxed))
            .field("queued", &self.tick_rx.len())
            .finish()
    }
}
