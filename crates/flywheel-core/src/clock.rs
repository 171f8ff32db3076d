//! Simulation clock.
//!
//! The clock owns the tick counter and derives each tick's simulated
//! timestamp from the configured start time and step. The tick number is
//! the source of truth; timestamps are computed from it and never stored.
//! Every derivation uses checked arithmetic.

use chrono::{DateTime, TimeDelta, Utc};
use flywheel_types::TickStamp;

use crate::config::TimeConfig;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// The simulated timestamp for a tick is outside the representable range.
    #[error("simulated time overflow at tick {tick}")]
    TimeOverflow {
        /// Tick whose timestamp could not be computed.
        tick: u64,
    },

    /// Invalid time configuration (e.g. a zero-second step).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Tick counter plus the simulated-time mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimClock {
    /// Current tick (0 before the first tick runs).
    tick: u64,

    /// Simulated timestamp of tick 0.
    start_time: DateTime<Utc>,

    /// Simulated seconds per tick after acceleration.
    step_seconds: i64,
}

impl SimClock {
    /// Create a clock at tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the step is zero or does
    /// not fit in a signed 64-bit second count.
    pub fn new(config: &TimeConfig) -> Result<Self, ClockError> {
        let step = config
            .base_tick_seconds
            .checked_mul(config.time_acceleration)
            .and_then(|s| i64::try_from(s).ok())
            .ok_or_else(|| ClockError::InvalidConfig {
                reason: String::from("base_tick_seconds * time_acceleration overflows"),
            })?;
        Self::from_parts(0, config.start_time, step)
    }

    /// Create a clock from explicit parameters (useful for resuming a run).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `step_seconds` is not positive.
    pub fn from_parts(
        tick: u64,
        start_time: DateTime<Utc>,
        step_seconds: i64,
    ) -> Result<Self, ClockError> {
        if step_seconds <= 0 {
            return Err(ClockError::InvalidConfig {
                reason: format!("tick step must be positive, got {step_seconds}s"),
            });
        }
        Ok(Self {
            tick,
            start_time,
            step_seconds,
        })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated timestamp of tick 0.
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Simulated seconds per tick.
    pub const fn step_seconds(&self) -> i64 {
        self.step_seconds
    }

    /// Simulated seconds between tick 0 and `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeOverflow`] if the product overflows.
    pub fn elapsed_seconds(&self, tick: u64) -> Result<i64, ClockError> {
        i64::try_from(tick)
            .ok()
            .and_then(|t| t.checked_mul(self.step_seconds))
            .ok_or(ClockError::TimeOverflow { tick })
    }

    /// Simulated timestamp of `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeOverflow`] if the timestamp is out of range.
    pub fn timestamp(&self, tick: u64) -> Result<DateTime<Utc>, ClockError> {
        let elapsed = self.elapsed_seconds(tick)?;
        TimeDelta::try_seconds(elapsed)
            .and_then(|delta| self.start_time.checked_add_signed(delta))
            .ok_or(ClockError::TimeOverflow { tick })
    }

    /// Tick and timestamp of the current tick.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeOverflow`] if the timestamp is out of range.
    pub fn stamp(&self) -> Result<TickStamp, ClockError> {
        Ok(TickStamp {
            tick: self.tick,
            at: self.timestamp(self.tick)?,
        })
    }
}
