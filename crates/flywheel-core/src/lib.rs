//! Simulation clock, tick orchestration and replay for the Flywheel market
//! simulation.
//!
//! This crate owns the tick loop: it advances simulated time, lets external
//! schedules and handlers propose commands, commits their effects through
//! the world store, folds every journaled event into the ranking engine and
//! journals the reviews that sales produce.
//!
//! # Modules
//!
//! - [`clock`] -- Deterministic simulated clock.
//! - [`config`] -- Configuration loading from `flywheel-config.yaml` into
//!   strongly-typed structs.
//! - [`lifecycle`] -- Run status and its legal transitions.
//! - [`operator`] -- Pause, resume, stop and queued commands at runtime.
//! - [`handler`] -- [`TickHandler`] trait and the per-tick [`TickContext`].
//! - [`demand`] -- Built-in shopper demand handler.
//! - [`fulfillment`] -- Built-in restocking handler.
//! - [`schedule`] -- Externally scheduled commands.
//! - [`orchestrator`] -- [`SimulationOrchestrator`], one tick at a time.
//! - [`runner`] -- The bounded run loop around the orchestrator.
//! - [`replay`] -- Rebuild state from the journal.
//!
//! [`TickHandler`]: handler::TickHandler
//! [`TickContext`]: handler::TickContext
//! [`SimulationOrchestrator`]: orchestrator::SimulationOrchestrator

pub mod clock;
pub mod config;
pub mod demand;
pub mod fulfillment;
pub mod handler;
pub mod lifecycle;
pub mod operator;
pub mod orchestrator;
pub mod replay;
pub mod runner;
pub mod schedule;

pub use config::{ConfigError, SimulationConfig};
pub use handler::{HandlerError, TickContext, TickHandler};
pub use lifecycle::SimulationStatus;
pub use operator::{OperatorState, RunFailure, SimulationEndReason};
pub use orchestrator::{OrchestratorError, SimulationOrchestrator, TickReport};
pub use replay::{ReplayError, ReplayedState, replay};
pub use runner::{NoOpCallback, RunSummary, RunnerError, TickCallback, run_simulation};
pub use schedule::{CommandSchedule, ScheduledCommand};
