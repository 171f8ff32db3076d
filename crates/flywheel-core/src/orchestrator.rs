//! The tick-driven simulation orchestrator.
//!
//! Each tick runs the same fixed sequence:
//!
//! 1. **Advance** -- move the clock and open a world-store batch.
//! 2. **Mark** -- stage `TickStarted`.
//! 3. **External** -- submit scheduled and operator-queued commands.
//! 4. **Handlers** -- invoke every handler concurrently against one
//!    read-only context, each bounded by the handler timeout, then submit
//!    their commands in registration order.
//! 5. **Reviews** -- draft reviews for the tick's staged sales and stage
//!    them.
//! 6. **Complete** -- stage `TickCompleted` with the tick's tallies and
//!    handler outcomes.
//! 7. **Commit** -- append the whole tick with one journal batch, then fold
//!    it into the ranking engine.
//!
//! Tick N+1 never starts before tick N has committed. Any journal failure
//! is fatal: the tick's staged writes are dropped, the run moves to
//! `Failed`, and the journal ends at the last committed tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flywheel_journal::{EventJournal, HistoryQuery, JournalError};
use flywheel_market::MarketRankingEngine;
use flywheel_types::{AgentId, Command, EventFactory, EventKind, SimulationId};
use flywheel_world::{WorldStore, WorldStoreError};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::clock::{ClockError, SimClock};
use crate::config::{CatalogEntry, SimulationConfig};
use crate::demand::DemandHandler;
use crate::fulfillment::RestockHandler;
use crate::handler::{TickContext, TickHandler};
use crate::lifecycle::{LifecycleError, SimulationStatus};
use crate::operator::{OperatorState, RunFailure, SimulationEndReason};
use crate::replay::{ReplayError, ReplayedState, replay};
use crate::schedule::CommandSchedule;

/// Agent recorded on catalog registrations.
pub const CATALOG_AGENT: &str = "catalog";

/// Agent recorded on drafted reviews.
pub const MARKET_AGENT: &str = "market";

/// Errors that stop the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The journal could not be read or written.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// The world store could not commit.
    #[error("world store error: {0}")]
    WorldStore(#[from] WorldStoreError),

    /// The clock could not advance.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// An illegal lifecycle move was attempted.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Replayed state could not be built or does not match.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// The journal already holds events for this run.
    #[error("run {simulation_id} already has history up to tick {latest_tick}")]
    RunExists {
        /// The run.
        simulation_id: SimulationId,
        /// Highest tick already journaled.
        latest_tick: u64,
    },

    /// Ticks can only run while the run is `Running`.
    #[error("cannot run a tick while {status:?}")]
    NotRunning {
        /// Status at the time of the call.
        status: SimulationStatus,
    },
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The tick.
    pub tick: u64,
    /// Its simulated time.
    pub at: DateTime<Utc>,
    /// Commands accepted.
    pub commands_accepted: u64,
    /// Commands rejected.
    pub commands_rejected: u64,
    /// Reviews journaled for the tick's sales.
    pub reviews_posted: usize,
    /// Handlers whose output was discarded after the timeout.
    pub timed_out_handlers: Vec<String>,
    /// Handlers that reported an error.
    pub failed_handlers: Vec<String>,
    /// Handlers skipped after an emergency stop.
    pub skipped_handlers: Vec<String>,
}

enum HandlerOutcome {
    Completed(Vec<Command>),
    TimedOut,
    Failed,
    Skipped,
}

/// Position of the ranking engine in the journal: the last tick it has
/// seen and how many of that tick's events it has folded.
#[derive(Debug, Clone, Copy, Default)]
struct RankingCursor {
    tick: u64,
    seen: usize,
}

/// Drives a run tick by tick.
pub struct SimulationOrchestrator {
    simulation_id: SimulationId,
    seed: u64,
    max_ticks: u64,
    journal: Arc<dyn EventJournal>,
    factory: Arc<EventFactory>,
    store: WorldStore,
    clock: SimClock,
    ranking: MarketRankingEngine,
    cursor: RankingCursor,
    handlers: Vec<Arc<dyn TickHandler>>,
    schedule: CommandSchedule,
    catalog: Vec<CatalogEntry>,
    operator: Arc<OperatorState>,
    handler_timeout: Duration,
    last_committed_tick: Option<u64>,
}

impl core::fmt::Debug for SimulationOrchestrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationOrchestrator")
            .field("simulation_id", &self.simulation_id)
            .field("tick", &self.clock.tick())
            .field("handlers", &self.handler_names())
            .field("last_committed_tick", &self.last_committed_tick)
            .finish_non_exhaustive()
    }
}

impl SimulationOrchestrator {
    /// Build an orchestrator with no handlers.
    ///
    /// The configured schedule and catalog are taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Clock`] if the time configuration is
    /// invalid.
    pub fn new(
        config: &SimulationConfig,
        journal: Arc<dyn EventJournal>,
        operator: Arc<OperatorState>,
    ) -> Result<Self, OrchestratorError> {
        let simulation_id = config.simulation_id();
        let clock = SimClock::new(&config.time)?;
        let factory = Arc::new(EventFactory::new(simulation_id));
        let store = WorldStore::new(
            Arc::clone(&journal),
            Arc::clone(&factory),
            config.arbitration.clone(),
            clock.stamp()?,
        );
        Ok(Self {
            simulation_id,
            seed: config.world.seed,
            max_ticks: config.bounds.max_ticks,
            journal,
            factory,
            store,
            clock,
            ranking: MarketRankingEngine::new(config.ranking.clone()),
            cursor: RankingCursor::default(),
            handlers: Vec::new(),
            schedule: CommandSchedule::from_entries(config.schedule.iter().cloned()),
            catalog: config.catalog.clone(),
            operator,
            handler_timeout: Duration::from_millis(config.handlers.timeout_ms),
            last_committed_tick: None,
        })
    }

    /// Build an orchestrator with its own operator state and the built-in
    /// demand and restock handlers enabled by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Clock`] if the time configuration is
    /// invalid.
    pub fn from_config(
        config: &SimulationConfig,
        journal: Arc<dyn EventJournal>,
    ) -> Result<Self, OrchestratorError> {
        let operator = Arc::new(OperatorState::new(config.time.tick_interval_ms, &config.bounds));
        let mut orchestrator = Self::new(config, journal, operator)?;
        if config.demand.enabled {
            orchestrator.register_handler(Arc::new(DemandHandler::new(config.demand.clone())));
        }
        if config.fulfillment.enabled {
            orchestrator.register_handler(Arc::new(RestockHandler::new(
                config.fulfillment.clone(),
            )));
        }
        Ok(orchestrator)
    }

    /// Add a handler. Its commands are submitted after those of every
    /// handler registered before it.
    pub fn register_handler(&mut self, handler: Arc<dyn TickHandler>) {
        self.handlers.push(handler);
    }

    /// Builder form of [`register_handler`](Self::register_handler).
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn TickHandler>) -> Self {
        self.register_handler(handler);
        self
    }

    /// Schedule an external command for `tick`.
    pub fn schedule_command(&mut self, tick: u64, command: Command) {
        self.schedule.push(tick, command);
    }

    /// The run identifier.
    pub const fn simulation_id(&self) -> SimulationId {
        self.simulation_id
    }

    /// Shared operator controls.
    pub const fn operator(&self) -> &Arc<OperatorState> {
        &self.operator
    }

    /// The journal this run writes to.
    pub const fn journal(&self) -> &Arc<dyn EventJournal> {
        &self.journal
    }

    /// The world store (read snapshots and submit commands).
    pub const fn store(&self) -> &WorldStore {
        &self.store
    }

    /// The ranking engine.
    pub const fn ranking(&self) -> &MarketRankingEngine {
        &self.ranking
    }

    /// Current clock tick.
    pub const fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Last tick whose events were fully committed.
    pub const fn last_committed_tick(&self) -> Option<u64> {
        self.last_committed_tick
    }

    /// Names of registered handlers, in registration order.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_owned()).collect()
    }

    /// Lifecycle status.
    pub async fn status(&self) -> SimulationStatus {
        self.operator.status().await
    }

    /// Start the run: journal `SimulationStarted` and register the catalog
    /// at tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Lifecycle`] unless the run is `Idle`,
    /// [`OrchestratorError::RunExists`] if the journal already holds this
    /// run, and any journal error. All but the first fail the run.
    pub async fn start(&mut self) -> Result<(), OrchestratorError> {
        self.operator.transition(SimulationStatus::Running).await?;
        let result = self.bootstrap().await;
        if result.is_err() {
            self.store.discard_batch().await;
        }
        self.settle(result).await
    }

    /// Execute one tick.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotRunning`] if the run is not
    /// `Running` (the run is left as is). Any other error fails the run.
    pub async fn run_tick(&mut self) -> Result<TickReport, OrchestratorError> {
        let status = self.operator.status().await;
        if status != SimulationStatus::Running {
            return Err(OrchestratorError::NotRunning { status });
        }
        let result = self.execute_tick().await;
        if result.is_err() {
            let discarded = self.store.discard_batch().await;
            debug!(tick = self.clock.tick(), discarded, "Uncommitted tick dropped");
        }
        self.settle(result).await
    }

    /// End the run: move through `Stopping`, journal `SimulationEnded`,
    /// then move to `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Lifecycle`] if the run cannot stop from
    /// its current status, or a journal error (which fails the run).
    pub async fn finish(&mut self, reason: SimulationEndReason) -> Result<(), OrchestratorError> {
        self.operator.transition(SimulationStatus::Stopping).await?;
        let result = self.record_end(reason).await;
        self.settle(result).await?;
        self.operator.transition(SimulationStatus::Stopped).await?;
        self.operator.set_end_reason(reason).await;
        info!(
            simulation_id = %self.simulation_id,
            reason = reason.as_str(),
            final_tick = self.clock.tick(),
            "Run stopped"
        );
        Ok(())
    }

    /// Live world and ranking state.
    pub async fn snapshot(&self) -> ReplayedState {
        ReplayedState {
            world: self.store.world().await,
            rankings: self.ranking.snapshot(),
            last_tick: self.last_committed_tick,
        }
    }

    /// Replay the journal and check it reproduces the live state.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Replay`] if the history cannot be folded
    /// or the result differs from [`snapshot`](Self::snapshot).
    pub async fn verify_replay(&self) -> Result<ReplayedState, OrchestratorError> {
        let replayed = replay(
            self.journal.as_ref(),
            self.simulation_id,
            self.ranking.config().clone(),
        )
        .await?;
        let live = self.snapshot().await;
        if replayed.world != live.world || replayed.rankings != live.rankings {
            return Err(ReplayError::Diverged {
                tick: replayed.last_tick.unwrap_or_default(),
            }
            .into());
        }
        Ok(replayed)
    }

    async fn bootstrap(&mut self) -> Result<(), OrchestratorError> {
        self.journal.initialize().await?;
        if let Some(latest_tick) = self.journal.get_latest_tick(self.simulation_id).await? {
            return Err(OrchestratorError::RunExists {
                simulation_id: self.simulation_id,
                latest_tick,
            });
        }

        self.store.open_batch().await;
        self.store
            .record(
                None,
                EventKind::SimulationStarted {
                    seed: self.seed,
                    max_ticks: self.max_ticks,
                },
            )
            .await?;

        let catalog_agent = AgentId::from(CATALOG_AGENT);
        for entry in &self.catalog {
            let command = Command::register(
                entry.product_id.clone(),
                entry.price,
                entry.cost,
                entry.inventory,
            )
            .by(catalog_agent.clone());
            let outcome = self.store.submit_command(&command).await?;
            if let Some(rejection) = outcome.rejection() {
                warn!(product = %entry.product_id, "Catalog entry not registered: {rejection}");
            }
        }

        self.store.commit_batch().await?;
        self.sync_rankings().await?;
        self.last_committed_tick = Some(self.clock.tick());
        info!(
            simulation_id = %self.simulation_id,
            seed = self.seed,
            products = self.catalog.len(),
            handlers = self.handlers.len(),
            "Run started"
        );
        Ok(())
    }

    async fn execute_tick(&mut self) -> Result<TickReport, OrchestratorError> {
        let tick = self.clock.advance()?;
        let stamp = self.clock.stamp()?;
        let elapsed_seconds = self.clock.elapsed_seconds(tick)?;

        self.store.begin_tick(stamp).await;
        self.store.open_batch().await;
        self.store
            .record(None, EventKind::TickStarted { elapsed_seconds })
            .await?;

        let mut external = self.schedule.commands_at(tick).to_vec();
        external.extend(self.operator.drain_commands().await);
        for command in &external {
            self.store.submit_command(command).await?;
        }

        let products = self.store.products().await;
        let visibility = self
            .ranking
            .visibility_map(products.iter().map(|p| &p.product_id));
        let context = TickContext {
            tick,
            at: stamp.at,
            seed: self.seed,
            products,
            visibility,
        };
        let outcomes = self.invoke_handlers(&context).await;

        let mut timed_out_handlers = Vec::new();
        let mut failed_handlers = Vec::new();
        let mut skipped_handlers = Vec::new();
        for (handler, outcome) in self.handlers.iter().zip(outcomes) {
            match outcome {
                HandlerOutcome::Completed(commands) => {
                    for command in &commands {
                        self.store.submit_command(command).await?;
                    }
                }
                HandlerOutcome::TimedOut => timed_out_handlers.push(handler.name().to_owned()),
                HandlerOutcome::Failed => failed_handlers.push(handler.name().to_owned()),
                HandlerOutcome::Skipped => skipped_handlers.push(handler.name().to_owned()),
            }
        }

        let staged = self.store.staged().await;
        let drafts = self
            .ranking
            .draft_reviews(&staged, self.seed, &self.factory, stamp);
        let reviews = self
            .store
            .record_batch(Some(&AgentId::from(MARKET_AGENT)), drafts)
            .await?;

        let tally = self.store.tally().await;
        self.store
            .record(
                None,
                EventKind::TickCompleted {
                    commands_accepted: tally.accepted,
                    commands_rejected: tally.rejected,
                    timed_out_handlers: timed_out_handlers.clone(),
                    failed_handlers: failed_handlers.clone(),
                    skipped_handlers: skipped_handlers.clone(),
                },
            )
            .await?;
        let committed = self.store.commit_batch().await?;
        self.sync_rankings().await?;
        self.last_committed_tick = Some(tick);

        info!(
            tick,
            events = committed.len(),
            accepted = tally.accepted,
            rejected = tally.rejected,
            reviews = reviews.len(),
            "Tick committed"
        );

        Ok(TickReport {
            tick,
            at: stamp.at,
            commands_accepted: tally.accepted,
            commands_rejected: tally.rejected,
            reviews_posted: reviews.len(),
            timed_out_handlers,
            failed_handlers,
            skipped_handlers,
        })
    }

    async fn invoke_handlers(&self, context: &TickContext) -> Vec<HandlerOutcome> {
        let operator = &self.operator;
        let timeout = self.handler_timeout;
        let calls = self.handlers.iter().map(|handler| async move {
            if operator.is_emergency_stop() {
                debug!(tick = context.tick, handler = handler.name(), "Handler skipped");
                return HandlerOutcome::Skipped;
            }
            match tokio::time::timeout(timeout, handler.on_tick(context)).await {
                Ok(Ok(commands)) => HandlerOutcome::Completed(commands),
                Ok(Err(e)) => {
                    warn!(tick = context.tick, handler = handler.name(), "Handler failed: {e}");
                    HandlerOutcome::Failed
                }
                Err(_) => {
                    warn!(
                        tick = context.tick,
                        handler = handler.name(),
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "Handler timed out; its commands for this tick are discarded"
                    );
                    HandlerOutcome::TimedOut
                }
            }
        });
        join_all(calls).await
    }

    /// Fold every journal event the ranking engine has not seen yet.
    /// Returns how many events were folded.
    async fn sync_rankings(&mut self) -> Result<usize, OrchestratorError> {
        let query = HistoryQuery::new().from_tick(self.cursor.tick);
        let history = self.journal.get_history(self.simulation_id, &query).await?;
        let mut folded = 0_usize;
        for event in history.iter().skip(self.cursor.seen) {
            folded = folded.saturating_add(1);
            self.ranking.observe(event);
            if event.tick() == self.cursor.tick {
                self.cursor.seen = self.cursor.seen.saturating_add(1);
            } else {
                self.cursor = RankingCursor {
                    tick: event.tick(),
                    seen: 1,
                };
            }
        }
        Ok(folded)
    }

    async fn record_end(&mut self, reason: SimulationEndReason) -> Result<(), OrchestratorError> {
        self.store
            .record(
                None,
                EventKind::SimulationEnded {
                    reason: reason.as_str().to_owned(),
                    final_tick: self.last_committed_tick.unwrap_or_default(),
                },
            )
            .await?;
        self.sync_rankings().await?;
        Ok(())
    }

    /// Fail the run if `result` is an error, then hand it back.
    async fn settle<T>(
        &self,
        result: Result<T, OrchestratorError>,
    ) -> Result<T, OrchestratorError> {
        if let Err(e) = &result {
            error!(
                simulation_id = %self.simulation_id,
                last_committed_tick = ?self.last_committed_tick,
                "Run failed: {e}"
            );
            self.operator
                .fail(RunFailure {
                    last_committed_tick: self.last_committed_tick,
                    error: e.to_string(),
                })
                .await;
        }
        result
    }
}
