//! Operator control state for runtime simulation management.
//!
//! This module provides shared state used by the tick loop and whatever
//! drives it from outside (a CLI, a test, an API layer). The operator can
//! pause/resume, change tick speed, queue commands, and stop the run
//! cleanly or as an emergency, all without stopping the process.
//!
//! # Architecture
//!
//! Control flags use [`std::sync::atomic`] types so the tick loop reads
//! them without locks on the hot path. The command queue, lifecycle status
//! and terminal outcome sit behind [`tokio::sync::Mutex`]es.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use flywheel_types::Command;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::config::BoundsConfig;
use crate::lifecycle::{LifecycleError, SimulationStatus};

/// Longest accepted tick interval.
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Reason why the simulation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// Reached the configured `max_real_time_seconds` limit.
    MaxRealTimeReached,
    /// An operator issued a stop command.
    OperatorStop,
    /// An operator issued an emergency stop.
    EmergencyStop,
}

impl SimulationEndReason {
    /// Stable string form recorded in the `SimulationEnded` event.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxTicksReached => "max_ticks_reached",
            Self::MaxRealTimeReached => "max_real_time_reached",
            Self::OperatorStop => "operator_stop",
            Self::EmergencyStop => "emergency_stop",
        }
    }
}

/// What a failed run exposes: how far it got and why it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Last tick whose events were fully committed, if any.
    pub last_committed_tick: Option<u64>,
    /// The fatal error.
    pub error: String,
}

/// Run controls shared between the tick loop and whoever steers it.
///
/// Held behind an [`std::sync::Arc`]. Flags are lock-free; the lifecycle,
/// outcome and command queue take short async locks.
#[derive(Debug)]
pub struct OperatorState {
    paused: AtomicBool,
    /// Wakes a paused loop on resume or stop.
    wake: Notify,
    stop_requested: AtomicBool,
    emergency: AtomicBool,
    /// Real-time pause between ticks; adjustable while running.
    tick_interval_ms: AtomicU64,
    /// Wall-clock creation time, for `max_real_time_seconds`.
    started_at: DateTime<Utc>,
    bounds: BoundsConfig,
    /// Commands applied at the next tick boundary, in arrival order.
    pending: Mutex<Vec<Command>>,
    status: Mutex<SimulationStatus>,
    end_reason: Mutex<Option<SimulationEndReason>>,
    failure: Mutex<Option<RunFailure>>,
}

impl OperatorState {
    /// Controls for a fresh `Idle` run. Intervals above
    /// [`MAX_TICK_INTERVAL_MS`] are capped.
    pub fn new(tick_interval_ms: u64, bounds: &BoundsConfig) -> Self {
        Self {
            paused: AtomicBool::default(),
            wake: Notify::new(),
            stop_requested: AtomicBool::default(),
            emergency: AtomicBool::default(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms.min(MAX_TICK_INTERVAL_MS)),
            started_at: Utc::now(),
            bounds: *bounds,
            pending: Mutex::default(),
            status: Mutex::new(SimulationStatus::Idle),
            end_reason: Mutex::default(),
            failure: Mutex::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Pausing
    // -----------------------------------------------------------------------

    /// Whether a pause is in effect.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Hold the loop before its next tick. The in-flight tick finishes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Lift the pause and wake the loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Park until the pause is lifted or a stop arrives.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            self.wake.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stopping
    // -----------------------------------------------------------------------

    /// Stop once the in-flight tick has committed.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Skip every handler of the current tick that has not started yet, then
    /// stop once the tick has committed.
    pub fn request_emergency_stop(&self) {
        self.emergency.store(true, Ordering::Release);
        self.request_stop();
    }

    /// Whether any stop (clean or emergency) was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Whether the requested stop is an emergency stop.
    pub fn is_emergency_stop(&self) -> bool {
        self.emergency.load(Ordering::Acquire)
    }

    /// Remember why the run ended.
    pub async fn set_end_reason(&self, reason: SimulationEndReason) {
        *self.end_reason.lock().await = Some(reason);
    }

    /// Why the run ended, once it has.
    pub async fn end_reason(&self) -> Option<SimulationEndReason> {
        *self.end_reason.lock().await
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Current lifecycle status.
    pub async fn status(&self) -> SimulationStatus {
        *self.status.lock().await
    }

    /// Move to `to` if the lifecycle allows it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] and leaves the status unchanged otherwise.
    pub async fn transition(&self, to: SimulationStatus) -> Result<(), LifecycleError> {
        let mut status = self.status.lock().await;
        *status = status.transition(to)?;
        Ok(())
    }

    /// Mark the run failed with the given outcome.
    ///
    /// A run that already reached a terminal state keeps it.
    pub async fn fail(&self, failure: RunFailure) {
        let mut status = self.status.lock().await;
        if status.is_terminal() {
            return;
        }
        *status = SimulationStatus::Failed;
        *self.failure.lock().await = Some(failure);
    }

    /// The fatal error and last committed tick, if the run failed.
    pub async fn failure(&self) -> Option<RunFailure> {
        self.failure.lock().await.clone()
    }

    // -----------------------------------------------------------------------
    // Pacing and limits
    // -----------------------------------------------------------------------

    /// Real-time pause between ticks, in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the pause between ticks (0 runs flat out) and return the old
    /// value. Values above [`MAX_TICK_INTERVAL_MS`] are refused with `None`.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        (ms <= MAX_TICK_INTERVAL_MS).then(|| self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    /// Whether `tick` is at or past a non-zero `max_ticks`.
    pub const fn tick_limit_reached(&self, tick: u64) -> bool {
        self.bounds.max_ticks != 0 && tick >= self.bounds.max_ticks
    }

    /// Whether a non-zero wall-clock budget has run out.
    pub fn time_limit_reached(&self) -> bool {
        let budget = self.bounds.max_real_time_seconds;
        budget != 0 && self.elapsed_seconds() >= budget
    }

    /// When these controls were created.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole wall-clock seconds since [`started_at`](Self::started_at).
    pub fn elapsed_seconds(&self) -> u64 {
        let seconds = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(seconds).unwrap_or_default()
    }

    /// Tick budget (0 = unlimited).
    pub const fn max_ticks(&self) -> u64 {
        self.bounds.max_ticks
    }

    /// Wall-clock budget in seconds (0 = unlimited).
    pub const fn max_real_time_seconds(&self) -> u64 {
        self.bounds.max_real_time_seconds
    }

    // -----------------------------------------------------------------------
    // Queued commands
    // -----------------------------------------------------------------------

    /// Queue a command for the start of the next tick.
    pub async fn enqueue_command(&self, command: Command) {
        self.pending.lock().await.push(command);
    }

    /// Take every queued command, oldest first.
    pub async fn drain_commands(&self) -> Vec<Command> {
        self.pending.lock().await.drain(..).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;

    fn default_bounds() -> BoundsConfig {
        BoundsConfig {
            max_ticks: 0,
            max_real_time_seconds: 0,
        }
    }

    #[test]
    fn fresh_controls_are_idle_flags() {
        let state = OperatorState::new(1000, &default_bounds());
        assert!(!state.is_paused());
        assert!(!state.is_stop_requested());
        assert!(!state.is_emergency_stop());
    }

    #[test]
    fn pause_and_resume() {
        let state = OperatorState::new(1000, &default_bounds());
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert!(!state.is_paused());
    }

    #[test]
    fn emergency_stop_implies_stop() {
        let state = OperatorState::new(1000, &default_bounds());
        state.request_emergency_stop();
        assert!(state.is_stop_requested());
        assert!(state.is_emergency_stop());
    }

    #[test]
    fn set_tick_interval() {
        let state = OperatorState::new(1000, &default_bounds());
        assert_eq!(state.set_tick_interval_ms(0), Some(1000));
        assert_eq!(state.tick_interval_ms(), 0);
        assert!(state.set_tick_interval_ms(u64::MAX).is_none());
        assert_eq!(state.tick_interval_ms(), 0);
    }

    #[test]
    fn zero_limits_never_trip() {
        let state = OperatorState::new(0, &default_bounds());
        assert!(!state.tick_limit_reached(u64::MAX));
        assert!(!state.time_limit_reached());
    }

    #[test]
    fn tick_limit_reached() {
        let bounds = BoundsConfig {
            max_ticks: 100,
            max_real_time_seconds: 0,
        };
        let state = OperatorState::new(0, &bounds);
        assert!(!state.tick_limit_reached(99));
        assert!(state.tick_limit_reached(100));
        assert_eq!(state.max_ticks(), 100);
    }

    #[tokio::test]
    async fn stop_wakes_a_paused_waiter() {
        let state = Arc::new(OperatorState::new(0, &default_bounds()));
        state.pause();
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_if_paused().await })
        };
        tokio::task::yield_now().await;
        state.request_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(state.is_paused());
    }

    #[tokio::test]
    async fn enqueue_and_drain_commands() {
        let state = OperatorState::new(0, &default_bounds());
        state
            .enqueue_command(Command::set_price("SKU-1", Decimal::TEN))
            .await;
        state.enqueue_command(Command::place_order("SKU-1", 2)).await;
        let drained = state.drain_commands().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind.type_name(), "set_price");
        assert!(state.drain_commands().await.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_and_failure() {
        let state = OperatorState::new(0, &default_bounds());
        assert_eq!(state.status().await, SimulationStatus::Idle);
        assert!(state.transition(SimulationStatus::Stopped).await.is_err());
        state.transition(SimulationStatus::Running).await.unwrap();

        state
            .fail(RunFailure {
                last_committed_tick: Some(3),
                error: String::from("disk full"),
            })
            .await;
        assert_eq!(state.status().await, SimulationStatus::Failed);
        assert_eq!(state.failure().await.unwrap().last_committed_tick, Some(3));

        // Terminal states stay put.
        state
            .fail(RunFailure {
                last_committed_tick: Some(9),
                error: String::from("later"),
            })
            .await;
        assert_eq!(state.failure().await.unwrap().error, "disk full");
    }
}
