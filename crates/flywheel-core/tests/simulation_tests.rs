//! End-to-end runs of the orchestrator against real journals.
//!
//! Scenarios cover the sales flywheel, determinism across runs and
//! backends, replay, fatal journal faults, handler timeouts and failures,
//! and the operator controls.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flywheel_core::config::CatalogEntry;
use flywheel_core::{
    HandlerError, NoOpCallback, OperatorState, OrchestratorError, ScheduledCommand,
    SimulationConfig, SimulationEndReason, SimulationOrchestrator, SimulationStatus, TickContext,
    TickHandler, run_simulation,
};
use flywheel_journal::{EventJournal, HistoryQuery, MemoryJournal, SqliteJournal, export_json_lines};
use flywheel_types::{Command, EventKind, ProductId};
use rust_decimal::Decimal;

fn sku() -> ProductId {
    ProductId::from("SKU-1")
}

/// One product, no built-in handlers, every unit sold draws a review.
fn flywheel_config(max_ticks: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.world.name = "flywheel-e2e".to_owned();
    config.bounds.max_ticks = max_ticks;
    config.demand.enabled = false;
    config.fulfillment.enabled = false;
    config.ranking.review_probability = 1.0;
    config.catalog = vec![CatalogEntry {
        product_id: sku(),
        price: Decimal::new(2000, 2),
        cost: Decimal::new(1000, 2),
        inventory: 100,
    }];
    config.schedule = vec![ScheduledCommand {
        tick: 1,
        command: Command::place_order(sku(), 10),
    }];
    config
}

/// Two products with demand and restocking enabled.
fn market_config(max_ticks: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.world.name = "flywheel-market".to_owned();
    config.world.seed = 7;
    config.bounds.max_ticks = max_ticks;
    config.catalog = vec![
        CatalogEntry {
            product_id: ProductId::from("SKU-A"),
            price: Decimal::new(1999, 2),
            cost: Decimal::new(800, 2),
            inventory: 60,
        },
        CatalogEntry {
            product_id: ProductId::from("SKU-B"),
            price: Decimal::new(3500, 2),
            cost: Decimal::new(2000, 2),
            inventory: 25,
        },
    ];
    config
}

async fn run_to_end(config: &SimulationConfig, journal: Arc<dyn EventJournal>) -> SimulationOrchestrator {
    let mut orchestrator = SimulationOrchestrator::from_config(config, journal).unwrap();
    run_simulation(&mut orchestrator, &mut NoOpCallback)
        .await
        .unwrap();
    orchestrator
}

struct SlowHandler;

#[async_trait]
impl TickHandler for SlowHandler {
    fn name(&self) -> &str {
        "slow"
    }

    async fn on_tick(&self, context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![Command::set_price(
            context.products[0].product_id.clone(),
            Decimal::ONE,
        )])
    }
}

struct FailingHandler;

#[async_trait]
impl TickHandler for FailingHandler {
    fn name(&self) -> &str {
        "failing"
    }

    async fn on_tick(&self, _context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        Err(HandlerError::Failed {
            reason: "model unavailable".to_owned(),
        })
    }
}

struct PriceSetter;

#[async_trait]
impl TickHandler for PriceSetter {
    fn name(&self) -> &str {
        "pricer"
    }

    async fn on_tick(&self, context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        Ok(context
            .products
            .iter()
            .map(|p| Command::set_price(p.product_id.clone(), Decimal::new(2500, 2)).by("pricer"))
            .collect())
    }
}

struct EmergencyTrigger(Arc<OperatorState>);

#[async_trait]
impl TickHandler for EmergencyTrigger {
    fn name(&self) -> &str {
        "trigger"
    }

    async fn on_tick(&self, _context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        self.0.request_emergency_stop();
        Ok(Vec::new())
    }
}

/// Takes the journal offline while the tick is in flight.
struct JournalOutage(Arc<MemoryJournal>);

#[async_trait]
impl TickHandler for JournalOutage {
    fn name(&self) -> &str {
        "outage"
    }

    async fn on_tick(&self, _context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        self.0.set_write_fault(true);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn sale_drives_reviews_velocity_and_rank() {
    let config = flywheel_config(1);
    let journal = Arc::new(MemoryJournal::new());
    let orchestrator = run_to_end(&config, journal.clone()).await;

    let reviews = journal
        .get_history(
            orchestrator.simulation_id(),
            &HistoryQuery::new().event_types(["review_posted"]),
        )
        .await
        .unwrap();
    assert_eq!(reviews.len(), 10);
    assert!(reviews.iter().all(|e| e.tick() == 1));

    let product = orchestrator.store().read_snapshot(&sku()).await.unwrap();
    assert_eq!(product.inventory, 90);

    let ranking = orchestrator.ranking().product(&sku()).unwrap();
    assert_eq!(ranking.total_sales, 10);
    assert!((ranking.velocity_7d - 10.0 / 7.0).abs() < 1e-9);
    assert!(ranking.bsr < config.ranking.initial_bsr);
    assert_eq!(ranking.review_count, 10);
    assert!((1.0..=5.0).contains(&ranking.average_rating));
}

#[tokio::test]
async fn tick_is_framed_by_markers() {
    let config = flywheel_config(2);
    let journal = Arc::new(MemoryJournal::new());
    let orchestrator = run_to_end(&config, journal.clone()).await;

    let history = journal
        .get_history(orchestrator.simulation_id(), &HistoryQuery::new())
        .await
        .unwrap();
    assert!(matches!(history[0].kind(), EventKind::SimulationStarted { seed: 42, max_ticks: 2 }));
    assert!(matches!(history[1].kind(), EventKind::ProductRegistered { .. }));

    let tick_one: Vec<_> = history.iter().filter(|e| e.tick() == 1).collect();
    assert!(matches!(tick_one[0].kind(), EventKind::TickStarted { elapsed_seconds: 86_400 }));
    assert!(matches!(
        tick_one.last().unwrap().kind(),
        EventKind::TickCompleted { commands_accepted: 1, commands_rejected: 0, .. }
    ));
    assert!(matches!(
        history.last().unwrap().kind(),
        EventKind::SimulationEnded { final_tick: 2, .. }
    ));
    assert_eq!(orchestrator.last_committed_tick(), Some(2));
}

#[tokio::test]
async fn identical_inputs_produce_identical_journals() {
    let config = market_config(30);
    let first = Arc::new(MemoryJournal::new());
    let second = Arc::new(MemoryJournal::new());
    let a = run_to_end(&config, first.clone()).await;
    let b = run_to_end(&config, second.clone()).await;
    assert_eq!(a.simulation_id(), b.simulation_id());

    let left = export_json_lines(&first.export(a.simulation_id()).await.unwrap()).unwrap();
    let right = export_json_lines(&second.export(b.simulation_id()).await.unwrap()).unwrap();
    assert!(!left.is_empty());
    assert_eq!(left, right);

    let sales = first
        .get_history(
            a.simulation_id(),
            &HistoryQuery::new().event_types(["sale_recorded"]),
        )
        .await
        .unwrap();
    assert!(!sales.is_empty());
}

#[tokio::test]
async fn different_seeds_diverge() {
    let config = market_config(30);
    let mut other = config.clone();
    other.world.seed = 8;
    let first = Arc::new(MemoryJournal::new());
    let second = Arc::new(MemoryJournal::new());
    let a = run_to_end(&config, first.clone()).await;
    let b = run_to_end(&other, second.clone()).await;
    assert_ne!(a.simulation_id(), b.simulation_id());
}

#[tokio::test]
async fn sqlite_file_journal_matches_memory_journal() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("journal.db").display());
    let config = market_config(15);

    let memory = Arc::new(MemoryJournal::new());
    let sqlite = Arc::new(SqliteJournal::connect(&url).await.unwrap());
    let a = run_to_end(&config, memory.clone()).await;
    let b = run_to_end(&config, sqlite.clone()).await;

    let query = HistoryQuery::new();
    let left = memory.get_history(a.simulation_id(), &query).await.unwrap();
    let right = sqlite.get_history(b.simulation_id(), &query).await.unwrap();
    assert_eq!(left.len(), right.len());
    for (l, r) in left.iter().zip(&right) {
        assert_eq!(l.event_id(), r.event_id());
        assert_eq!(l.event_type(), r.event_type());
        assert_eq!(l.tick(), r.tick());
    }
    b.verify_replay().await.unwrap();
}

#[tokio::test]
async fn replay_reproduces_live_state() {
    let config = market_config(40);
    let journal = Arc::new(MemoryJournal::new());
    let orchestrator = run_to_end(&config, journal.clone()).await;

    let replayed = orchestrator.verify_replay().await.unwrap();
    let live = orchestrator.snapshot().await;
    assert_eq!(replayed.world, live.world);
    assert_eq!(replayed.rankings, live.rankings);
    assert_eq!(replayed.last_tick, Some(40));
}

#[tokio::test]
async fn journal_fault_fails_the_run_at_the_last_committed_tick() {
    let config = flywheel_config(10);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal.clone()).unwrap();
    orchestrator.start().await.unwrap();
    orchestrator.run_tick().await.unwrap();

    journal.set_write_fault(true);
    let err = orchestrator.run_tick().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::WorldStore(_)));
    assert_eq!(orchestrator.status().await, SimulationStatus::Failed);

    let failure = orchestrator.operator().failure().await.unwrap();
    assert_eq!(failure.last_committed_tick, Some(1));
    assert!(!failure.error.is_empty());

    let err = orchestrator.run_tick().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::NotRunning { status: SimulationStatus::Failed }
    ));
    assert_eq!(
        journal.get_latest_tick(orchestrator.simulation_id()).await.unwrap(),
        Some(1)
    );
}

#[tokio::test]
async fn journal_outage_mid_tick_leaves_no_partial_tick() {
    let config = flywheel_config(10);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal.clone())
        .unwrap()
        .with_handler(Arc::new(JournalOutage(journal.clone())));

    // Tick 1 sells 10 units before the outage handler runs.
    let err = run_simulation(&mut orchestrator, &mut NoOpCallback)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("journal"));
    assert_eq!(orchestrator.status().await, SimulationStatus::Failed);
    let failure = orchestrator.operator().failure().await.unwrap();
    assert_eq!(failure.last_committed_tick, Some(0));

    let run = orchestrator.simulation_id();
    assert_eq!(journal.get_latest_tick(run).await.unwrap(), Some(0));
    let tick_one = journal
        .get_history(run, &HistoryQuery::new().at_tick(1))
        .await
        .unwrap();
    assert!(tick_one.is_empty());

    let live = orchestrator.store().read_snapshot(&sku()).await.unwrap();
    assert_eq!(live.inventory, 100);
    let replayed = orchestrator.verify_replay().await.unwrap();
    assert_eq!(replayed.last_tick, Some(0));
    assert_eq!(replayed.world.product(&sku()).unwrap().inventory, 100);
}

#[tokio::test]
async fn starting_an_existing_run_is_refused() {
    let config = flywheel_config(1);
    let journal: Arc<dyn EventJournal> = Arc::new(MemoryJournal::new());
    run_to_end(&config, Arc::clone(&journal)).await;

    let mut again = SimulationOrchestrator::from_config(&config, journal).unwrap();
    let err = again.start().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::RunExists { latest_tick: 1, .. }));
    assert_eq!(again.status().await, SimulationStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn slow_handler_is_timed_out_and_its_commands_dropped() {
    let mut config = flywheel_config(1);
    config.handlers.timeout_ms = 100;
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal)
        .unwrap()
        .with_handler(Arc::new(SlowHandler))
        .with_handler(Arc::new(PriceSetter));
    orchestrator.start().await.unwrap();

    let report = orchestrator.run_tick().await.unwrap();
    assert_eq!(report.timed_out_handlers, vec!["slow".to_owned()]);
    assert!(report.failed_handlers.is_empty());

    let product = orchestrator.store().read_snapshot(&sku()).await.unwrap();
    assert_eq!(product.price, Decimal::new(2500, 2));
}

#[tokio::test]
async fn failing_handler_does_not_stop_the_tick() {
    let config = flywheel_config(1);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal)
        .unwrap()
        .with_handler(Arc::new(FailingHandler))
        .with_handler(Arc::new(PriceSetter));
    orchestrator.start().await.unwrap();

    let report = orchestrator.run_tick().await.unwrap();
    assert_eq!(report.failed_handlers, vec!["failing".to_owned()]);
    assert_eq!(report.commands_accepted, 2);
    assert_eq!(orchestrator.status().await, SimulationStatus::Running);
}

#[tokio::test]
async fn emergency_stop_skips_remaining_handlers_then_ends() {
    let config = flywheel_config(10);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal.clone()).unwrap();
    let trigger = EmergencyTrigger(Arc::clone(orchestrator.operator()));
    orchestrator.register_handler(Arc::new(trigger));
    orchestrator.register_handler(Arc::new(PriceSetter));

    let summary = run_simulation(&mut orchestrator, &mut NoOpCallback)
        .await
        .unwrap();
    assert_eq!(summary.end_reason, SimulationEndReason::EmergencyStop);
    assert_eq!(summary.total_ticks, 1);
    let report = summary.final_report.unwrap();
    assert_eq!(report.skipped_handlers, vec!["pricer".to_owned()]);

    let ended = journal
        .get_history(
            orchestrator.simulation_id(),
            &HistoryQuery::new().event_types(["simulation_ended"]),
        )
        .await
        .unwrap();
    assert!(matches!(
        ended[0].kind(),
        EventKind::SimulationEnded { reason, final_tick: 1 } if reason == "emergency_stop"
    ));
}

#[tokio::test]
async fn paused_run_resumes_and_completes() {
    let config = flywheel_config(3);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal).unwrap();
    let operator = Arc::clone(orchestrator.operator());
    operator.pause();

    let resumer = {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            operator.resume();
        })
    };

    let summary = run_simulation(&mut orchestrator, &mut NoOpCallback)
        .await
        .unwrap();
    resumer.await.unwrap();
    assert_eq!(summary.end_reason, SimulationEndReason::MaxTicksReached);
    assert_eq!(summary.total_ticks, 3);
    assert_eq!(orchestrator.status().await, SimulationStatus::Stopped);
}

#[tokio::test]
async fn stop_while_paused_ends_cleanly() {
    let config = flywheel_config(3);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal).unwrap();
    let operator = Arc::clone(orchestrator.operator());
    operator.pause();

    let stopper = {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            operator.request_stop();
        })
    };

    let summary = run_simulation(&mut orchestrator, &mut NoOpCallback)
        .await
        .unwrap();
    stopper.await.unwrap();
    assert_eq!(summary.end_reason, SimulationEndReason::OperatorStop);
    assert_eq!(summary.total_ticks, 0);
    assert_eq!(orchestrator.status().await, SimulationStatus::Stopped);
}

#[tokio::test]
async fn operator_commands_apply_at_the_next_tick() {
    let config = flywheel_config(5);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal).unwrap();
    orchestrator.start().await.unwrap();
    orchestrator
        .operator()
        .enqueue_command(Command::set_price(sku(), Decimal::new(1500, 2)).by("operator"))
        .await;

    let report = orchestrator.run_tick().await.unwrap();
    assert_eq!(report.commands_accepted, 2);
    let product = orchestrator.store().read_snapshot(&sku()).await.unwrap();
    assert_eq!(product.price, Decimal::new(1500, 2));
    assert!(orchestrator.operator().drain_commands().await.is_empty());
}

#[tokio::test]
async fn ticks_require_a_running_simulation() {
    let config = flywheel_config(5);
    let journal = Arc::new(MemoryJournal::new());
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal).unwrap();
    let err = orchestrator.run_tick().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::NotRunning { status: SimulationStatus::Idle }
    ));
    assert_eq!(orchestrator.status().await, SimulationStatus::Idle);
}
