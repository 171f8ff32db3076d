//! Run lifecycle states.
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |          |
//!            +-> Stopping <-+
//!                  |
//!               Stopped
//! ```
//!
//! Any state except `Stopped` may move to `Failed`. `Stopped` and
//! `Failed` are terminal.

use serde::{Deserialize, Serialize};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    /// Built but not started.
    Idle,
    /// Advancing ticks.
    Running,
    /// Waiting for a resume.
    Paused,
    /// A stop was requested; the in-flight tick is finishing.
    Stopping,
    /// Ended cleanly.
    Stopped,
    /// Ended on an unrecoverable error.
    Failed,
}

/// A transition the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move from {from:?} to {to:?}")]
pub struct LifecycleError {
    /// State before the attempted transition.
    pub from: SimulationStatus,
    /// Requested state.
    pub to: SimulationStatus,
}

impl SimulationStatus {
    /// Whether the run can no longer change state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Whether `self -> to` is a legal move.
    pub const fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Stopped | Self::Failed, _) => false,
            (_, Self::Failed)
            | (Self::Idle | Self::Paused, Self::Running)
            | (Self::Running, Self::Paused)
            | (Self::Running | Self::Paused, Self::Stopping)
            | (Self::Stopping, Self::Stopped) => true,
            _ => false,
        }
    }

    /// The state after `self -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the move is not allowed.
    pub const fn transition(self, to: Self) -> Result<Self, LifecycleError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(LifecycleError { from: self, to })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::SimulationStatus::{Failed, Idle, Paused, Running, Stopped, Stopping};
    use super::*;

    #[test]
    fn normal_run_path() {
        let mut status = Idle;
        for next in [Running, Paused, Running, Stopping, Stopped] {
            status = status.transition(next).unwrap_or(status);
            assert_eq!(status, next);
        }
        assert!(status.is_terminal());
    }

    #[test]
    fn paused_run_can_stop() {
        assert!(Paused.can_transition_to(Stopping));
    }

    #[test]
    fn any_live_state_can_fail() {
        for from in [Idle, Running, Paused, Stopping] {
            assert!(from.can_transition_to(Failed), "{from:?}");
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for to in [Idle, Running, Paused, Stopping, Stopped, Failed] {
            assert!(!Stopped.can_transition_to(to));
            assert!(!Failed.can_transition_to(to));
        }
    }

    #[test]
    fn illegal_moves_are_reported() {
        let err = Idle.transition(Stopped).unwrap_err();
        assert_eq!(err, LifecycleError { from: Idle, to: Stopped });
        assert!(Idle.transition(Paused).is_err());
        assert!(Stopping.transition(Running).is_err());
    }
}
