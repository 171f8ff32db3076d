//! The bounded run loop.
//!
//! [`run_simulation`] repeats [`SimulationOrchestrator::run_tick`] until
//! the tick budget or wall-clock budget runs out, or an operator stops the
//! run. Between ticks it honors pause requests and the configured
//! real-time interval. A tick that has begun always commits before the
//! loop looks at stop requests again; the run then ends with
//! `SimulationEnded`.

use std::time::Duration;

use tracing::{info, warn};

use crate::lifecycle::SimulationStatus;
use crate::operator::SimulationEndReason;
use crate::orchestrator::{OrchestratorError, SimulationOrchestrator, TickReport};

/// Why the run loop gave up.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The orchestrator failed; the run is `Failed`.
    #[error("orchestrator error: {source}")]
    Orchestrator {
        /// The underlying orchestrator error.
        #[from]
        source: OrchestratorError,
    },
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Which limit or request ended it.
    pub end_reason: SimulationEndReason,
    /// The last tick report, if any tick completed.
    pub final_report: Option<TickReport>,
    /// Number of ticks executed by this call.
    pub total_ticks: u64,
    /// Last tick whose events were fully committed.
    pub last_committed_tick: Option<u64>,
}

/// Observer of committed ticks, e.g. for progress output or metrics sampling.
pub trait TickCallback: Send {
    /// Called after a tick commits.
    fn on_tick(&mut self, report: &TickReport);
}

/// A no-op tick callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &TickReport) {}
}

/// Drive ticks until a limit or an operator ends the run.
///
/// Starts the run first if it is still `Idle`. Stop conditions are checked
/// between ticks, so a tick that has begun always commits before the run
/// ends.
///
/// # Errors
///
/// Returns [`RunnerError`] if the orchestrator fails. The operator state
/// then reports `Failed` with the last committed tick.
pub async fn run_simulation(
    orchestrator: &mut SimulationOrchestrator,
    callback: &mut dyn TickCallback,
) -> Result<RunSummary, RunnerError> {
    let operator = std::sync::Arc::clone(orchestrator.operator());
    if orchestrator.status().await == SimulationStatus::Idle {
        orchestrator.start().await?;
    }

    let mut final_report: Option<TickReport> = None;
    let mut total_ticks = 0_u64;

    info!(
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Entering run loop"
    );

    let end_reason = loop {
        if operator.is_paused() && !operator.is_stop_requested() {
            operator
                .transition(SimulationStatus::Paused)
                .await
                .map_err(OrchestratorError::from)?;
            info!(tick = orchestrator.tick(), "Paused");
            operator.wait_if_paused().await;
            if !operator.is_stop_requested() {
                operator
                    .transition(SimulationStatus::Running)
                    .await
                    .map_err(OrchestratorError::from)?;
                info!(tick = orchestrator.tick(), "Resumed");
            }
        }

        // Stops and limits are only honored between ticks.
        if operator.is_emergency_stop() {
            info!("Emergency stop");
            break SimulationEndReason::EmergencyStop;
        }
        if operator.is_stop_requested() {
            info!("Stopped by operator");
            break SimulationEndReason::OperatorStop;
        }

        if operator.time_limit_reached() {
            info!(
                budget_seconds = operator.max_real_time_seconds(),
                elapsed_seconds = operator.elapsed_seconds(),
                "Real-time limit reached"
            );
            break SimulationEndReason::MaxRealTimeReached;
        }

        let report = orchestrator.run_tick().await?;
        total_ticks = total_ticks.saturating_add(1);
        callback.on_tick(&report);

        let tick_limit = operator.tick_limit_reached(report.tick);
        final_report = Some(report);
        if tick_limit {
            info!(
                tick = orchestrator.tick(),
                max_ticks = operator.max_ticks(),
                "Tick limit reached"
            );
            break SimulationEndReason::MaxTicksReached;
        }

        let pace = operator.tick_interval_ms();
        if pace != 0 && !operator.is_stop_requested() {
            tokio::time::sleep(Duration::from_millis(pace)).await;
        }
    };

    orchestrator.finish(end_reason).await?;

    Ok(RunSummary {
        end_reason,
        final_report,
        total_ticks,
        last_committed_tick: orchestrator.last_committed_tick(),
    })
}

/// Log the outcome of a finished run.
pub fn log_simulation_end(summary: &RunSummary) {
    info!(
        reason = summary.end_reason.as_str(),
        total_ticks = summary.total_ticks,
        last_committed_tick = summary.last_committed_tick,
        "Simulation ended"
    );

    if let Some(ref report) = summary.final_report {
        info!(
            tick = report.tick,
            at = %report.at,
            accepted = report.commands_accepted,
            rejected = report.commands_rejected,
            reviews = report.reviews_posted,
            "Final tick report"
        );
    } else {
        warn!("Run ended before its first tick");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use flywheel_journal::MemoryJournal;

    use super::*;
    use crate::config::SimulationConfig;

    struct Counter(u64);

    impl TickCallback for Counter {
        fn on_tick(&mut self, _report: &TickReport) {
            self.0 = self.0.saturating_add(1);
        }
    }

    fn orchestrator(max_ticks: u64) -> SimulationOrchestrator {
        let mut config = SimulationConfig::default();
        config.bounds.max_ticks = max_ticks;
        SimulationOrchestrator::from_config(&config, Arc::new(MemoryJournal::new())).unwrap()
    }

    #[tokio::test]
    async fn runs_until_tick_limit() {
        let mut orchestrator = orchestrator(3);
        let mut counter = Counter(0);
        let summary = run_simulation(&mut orchestrator, &mut counter)
            .await
            .unwrap();
        assert_eq!(summary.end_reason, SimulationEndReason::MaxTicksReached);
        assert_eq!(summary.total_ticks, 3);
        assert_eq!(summary.last_committed_tick, Some(3));
        assert_eq!(counter.0, 3);
        assert_eq!(summary.final_report.map(|r| r.tick), Some(3));
        assert_eq!(orchestrator.status().await, SimulationStatus::Stopped);
        assert_eq!(
            orchestrator.operator().end_reason().await,
            Some(SimulationEndReason::MaxTicksReached)
        );
    }

    #[tokio::test]
    async fn stop_before_first_tick_runs_nothing() {
        let mut orchestrator = orchestrator(10);
        orchestrator.operator().request_stop();
        let summary = run_simulation(&mut orchestrator, &mut NoOpCallback)
            .await
            .unwrap();
        assert_eq!(summary.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(summary.total_ticks, 0);
        assert_eq!(summary.final_report, None);
        assert_eq!(summary.last_committed_tick, Some(0));
        log_simulation_end(&summary);
    }

    #[tokio::test]
    async fn emergency_stop_is_reported() {
        let mut orchestrator = orchestrator(10);
        orchestrator.operator().request_emergency_stop();
        let summary = run_simulation(&mut orchestrator, &mut NoOpCallback)
            .await
            .unwrap();
        assert_eq!(summary.end_reason, SimulationEndReason::EmergencyStop);
    }
}
