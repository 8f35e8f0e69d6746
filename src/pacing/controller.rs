//! Adaptive pacing controller.
//!
//! Feedback loop over measured patch cost: the update interval drifts toward
//! `cost / target_fraction` so that patching takes roughly the target share
//! of each interval. Smoothing keeps a single slow patch from spiking the
//! interval, and the result is clamped to `[base, ceiling]`.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Configuration for the pacing controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// Starting and minimum update interval.
    pub base_interval: Duration,
    /// Share of the interval that patching may take (0.0 exclusive to 1.0).
    pub target_fraction: f64,
    /// Weight of each new sample (0.0 exclusive to 1.0).
    pub smoothing: f64,
    /// Ceiling as a multiple of the base interval.
    pub ceiling_multiplier: u32,
    /// Lower bound of the ceiling.
    pub ceiling_floor: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(50),
            target_fraction: 0.25,
            smoothing: 0.3,
            ceiling_multiplier: 4,
            ceiling_floor: Duration::from_millis(200),
        }
    }
}

impl PacingConfig {
    /// Set the base interval.
    #[must_use]
    pub const fn with_base_interval(mut self, base: Duration) -> Self {
        self.base_interval = base;
        self
    }

    /// Set the target fraction.
    #[must_use]
    pub const fn with_target_fraction(mut self, fraction: f64) -> Self {
        self.target_fraction = fraction;
        self
    }

    /// Set the smoothing factor.
    #[must_use]
    pub const fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Set the ceiling multiplier and floor.
    #[must_use]
    pub const fn with_ceiling(mut self, multiplier: u32, floor: Duration) -> Self {
        self.ceiling_multiplier = multiplier;
        self.ceiling_floor = floor;
        self
    }

    /// Largest interval the controller will choose.
    pub fn max_interval(&self) -> Duration {
        (self.base_interval * self.ceiling_multiplier).max(self.ceiling_floor)
    }

    /// Check that fractions and intervals are in range.
    pub fn validate(&self) -> Result<()> {
        if self.base_interval.is_zero() {
            return Err(Error::config("base interval must be positive"));
        }
        if !(self.target_fraction > 0.0 && self.target_fraction <= 1.0) {
            return Err(Error::config(format!(
                "target fraction must be within (0, 1], got {}",
                self.target_fraction
            )));
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(Error::config(format!(
                "smoothing must be within (0, 1], got {}",
                self.smoothing
            )));
        }
        if self.ceiling_multiplier == 0 {
            return Err(Error::config("ceiling multiplier must be at least 1"));
        }
        Ok(())
    }
}

/// Adaptive interval controller for one streaming session.
#[derive(Debug, Clone)]
pub struct PacingController {
    config: PacingConfig,
    /// Current interval in milliseconds.
    interval_ms: f64,
    last_duration: Duration,
    samples: u64,
    total_duration: Duration,
}

impl Default for PacingController {
    fn default() -> Self {
        Self::build(PacingConfig::default())
    }
}

impl PacingController {
    /// Create a controller from a validated configuration.
    pub fn new(config: PacingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PacingConfig) -> Self {
        Self {
            interval_ms: millis(config.base_interval),
            config,
            last_duration: Duration::ZERO,
            samples: 0,
            total_duration: Duration::ZERO,
        }
    }

    /// The configuration in use.
    pub const fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Feed the measured cost of one apply. Returns the new interval.
    pub fn record_duration(&mut self, duration: Duration) -> Duration {
        let base = millis(self.config.base_interval);
        let ceiling = millis(self.config.max_interval());
        let ideal = millis(duration) / self.config.target_fraction;

        let previous = self.interval_ms;
        self.interval_ms += (ideal - self.interval_ms) * self.config.smoothing;
        self.interval_ms = self.interval_ms.clamp(base, ceiling);

        self.last_duration = duration;
        self.samples += 1;
        self.total_duration += duration;

        if (self.interval_ms - previous).abs() >= 1.0 {
            debug!(
                cost_ms = millis(duration),
                interval_ms = self.interval_ms,
                "pacing interval adjusted"
            );
        }
        self.current_interval()
    }

    /// Interval to wait between applies.
    pub fn current_interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_ms / 1000.0)
    }

    /// Cost of the most recent apply.
    pub const fn last_duration(&self) -> Duration {
        self.last_duration
    }

    /// Number of durations recorded since the last reset.
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Mean recorded cost since the last reset.
    pub fn mean_duration(&self) -> Duration {
        u32::try_from(self.samples)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| self.total_duration / n)
    }

    /// Largest interval the controller will choose.
    pub fn max_interval(&self) -> Duration {
        self.config.max_interval()
    }

    /// Return to the base interval and forget all samples.
    pub fn reset(&mut self) {
        self.interval_ms = millis(self.config.base_interval);
        self.last_duration = Duration::ZERO;
        self.samples = 0;
        self.total_duration = Duration::ZERO;
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
