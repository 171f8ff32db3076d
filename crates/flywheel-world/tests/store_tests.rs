//! Integration tests for the world store against an in-memory journal.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::indexing_slicing)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use flywheel_journal::{EventJournal, HistoryQuery, MemoryJournal};
use flywheel_types::{
    Command, CommandKind, EventFactory, EventKind, ProductId, SimulationId,
    TickStamp,
};
use flywheel_world::{ArbitrationConfig, WorldStore, WorldStoreError};
use rust_decimal::Decimal;

fn stamp(tick: u64) -> TickStamp {
    TickStamp {
        tick,
        at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

async fn setup() -> (Arc<MemoryJournal>, WorldStore, SimulationId) {
    let journal = Arc::new(MemoryJournal::new());
    journal.initialize().await.unwrap();
    let simulation_id = SimulationId::derive("store", 7);
    let store = WorldStore::new(
        journal.clone(),
        Arc::new(EventFactory::new(simulation_id)),
        ArbitrationConfig::default(),
        stamp(0),
    );
    let outcome = store
        .submit_command(&Command::register(
            "SKU-1",
            Decimal::new(2000, 2),
            Decimal::new(1000, 2),
            100,
        ))
        .await
        .unwrap();
    assert!(outcome.is_accepted());
    (journal, store, simulation_id)
}

#[tokio::test]
async fn rejected_command_has_no_effect() {
    let (journal, store, run) = setup().await;
    store.begin_tick(stamp(1)).await;
    let before = store.world().await;
    let events_before = journal.len().await;

    let outcome = store
        .submit_command(&Command::place_order("SKU-1", 500).by("buyer"))
        .await
        .unwrap();
    assert_eq!(outcome.rejection().unwrap().code(), "insufficient_inventory");
    assert!(outcome.events().is_empty());

    assert_eq!(store.world().await, before);
    assert_eq!(journal.len().await, events_before);
    assert_eq!(store.tally().await.rejected, 1);
    assert_eq!(journal.get_latest_tick(run).await.unwrap(), Some(0));
}

#[tokio::test]
async fn accepted_command_is_journaled_before_it_is_visible() {
    let (journal, store, run) = setup().await;
    store.begin_tick(stamp(1)).await;

    let outcome = store
        .submit_command(&Command::place_order("SKU-1", 10).by("buyer"))
        .await
        .unwrap();
    assert!(outcome.is_accepted());
    let events = outcome.events().to_vec();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].agent_id().unwrap().as_str(), "buyer");

    let snapshot = store.read_snapshot(&ProductId::new("SKU-1")).await.unwrap();
    assert_eq!(snapshot.inventory, 90);
    assert_eq!(snapshot.units_sold, 10);
    assert_eq!(snapshot.revenue, Decimal::new(20000, 2));

    let sales = journal
        .get_history(run, &HistoryQuery::new().event_types(["sale_recorded"]))
        .await
        .unwrap();
    assert_eq!(sales, events);
}

#[tokio::test]
async fn journal_fault_leaves_world_unchanged() {
    let (journal, store, _) = setup().await;
    store.begin_tick(stamp(1)).await;
    let before = store.world().await;

    journal.set_write_fault(true);
    let err = store
        .submit_command(&Command::set_price("SKU-1", Decimal::new(2500, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, WorldStoreError::Journal(_)));
    assert_eq!(store.world().await, before);
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let (_, store, _) = setup().await;
    let store = Arc::new(store);
    store.begin_tick(stamp(1)).await;

    let mut tasks = Vec::new();
    for buyer in 0..30 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .submit_command(&Command::place_order("SKU-1", 7).by(format!("buyer-{buyer}")))
                .await
                .unwrap()
                .is_accepted()
        }));
    }
    let mut accepted = 0_u32;
    for task in tasks {
        if task.await.unwrap() {
            accepted += 1;
        }
    }

    // 100 units / 7 per order.
    assert_eq!(accepted, 14);
    let snapshot = store.read_snapshot(&ProductId::new("SKU-1")).await.unwrap();
    assert_eq!(snapshot.inventory, 2);
    let tally = store.begin_tick(stamp(2)).await;
    assert_eq!(tally.accepted, 14);
    assert_eq!(tally.rejected, 16);
}

#[tokio::test]
async fn set_price_on_unknown_product_creates_it() {
    let (_, store, _) = setup().await;
    store.begin_tick(stamp(3)).await;
    let outcome = store
        .submit_command(&Command::set_price("SKU-2", Decimal::new(999, 2)))
        .await
        .unwrap();
    assert!(outcome.is_accepted());
    let product = store.read_snapshot(&ProductId::new("SKU-2")).await.unwrap();
    assert_eq!(product.price, Decimal::new(999, 2));
    assert_eq!(product.created_tick, 3);
    assert_eq!(store.products().await.len(), 2);
}

#[tokio::test]
async fn system_events_share_the_ordered_path() {
    let (journal, store, run) = setup().await;
    store.begin_tick(stamp(1)).await;
    store
        .record(None, EventKind::TickStarted { elapsed_seconds: 86_400 })
        .await
        .unwrap();
    store
        .submit_command(&Command::new(CommandKind::RespondToCustomerMessage {
            message_id: String::from("m-1"),
            product_id: Some(ProductId::new("SKU-1")),
            response: String::from("Thanks for reaching out."),
        }))
        .await
        .unwrap();
    assert!(store.world().await.is_answered("m-1"));

    let history = journal.get_history(run, &HistoryQuery::new().at_tick(1)).await.unwrap();
    let types: Vec<_> = history.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["tick_started", "customer_message_answered"]);
}

#[tokio::test]
async fn batch_is_visible_to_arbitration_but_journaled_on_commit() {
    let (journal, store, run) = setup().await;
    store.begin_tick(stamp(1)).await;
    store.open_batch().await;
    let events_before = journal.len().await;

    store
        .record(None, EventKind::TickStarted { elapsed_seconds: 86_400 })
        .await
        .unwrap();
    let first = store
        .submit_command(&Command::place_order("SKU-1", 60).by("buyer-1"))
        .await
        .unwrap();
    assert!(first.is_accepted());
    // The staged sale already counts against stock.
    let second = store
        .submit_command(&Command::place_order("SKU-1", 60).by("buyer-2"))
        .await
        .unwrap();
    assert_eq!(second.rejection().unwrap().code(), "insufficient_inventory");

    assert_eq!(journal.len().await, events_before);
    assert_eq!(store.staged().await.len(), 2);
    assert_eq!(journal.get_latest_tick(run).await.unwrap(), Some(0));

    let committed = store.commit_batch().await.unwrap();
    assert_eq!(committed.len(), 2);
    assert!(store.staged().await.is_empty());
    let history = journal.get_history(run, &HistoryQuery::new().at_tick(1)).await.unwrap();
    assert_eq!(history, committed);
    let snapshot = store.read_snapshot(&ProductId::new("SKU-1")).await.unwrap();
    assert_eq!(snapshot.inventory, 40);
}

#[tokio::test]
async fn failed_batch_commit_rolls_back_the_whole_tick() {
    let (journal, store, run) = setup().await;
    let before = store.world().await;
    let events_before = journal.len().await;

    store.begin_tick(stamp(1)).await;
    store.open_batch().await;
    store
        .record(None, EventKind::TickStarted { elapsed_seconds: 86_400 })
        .await
        .unwrap();
    store
        .submit_command(&Command::place_order("SKU-1", 10).by("buyer"))
        .await
        .unwrap();
    assert_eq!(
        store.read_snapshot(&ProductId::new("SKU-1")).await.unwrap().inventory,
        90
    );

    journal.set_write_fault(true);
    let err = store.commit_batch().await.unwrap_err();
    assert!(matches!(err, WorldStoreError::Journal(_)));

    assert_eq!(store.world().await, before);
    assert_eq!(journal.len().await, events_before);
    assert_eq!(journal.get_latest_tick(run).await.unwrap(), Some(0));
    assert!(store.staged().await.is_empty());
}

#[tokio::test]
async fn discarded_batch_restores_the_checkpoint() {
    let (journal, store, _) = setup().await;
    let before = store.world().await;
    store.begin_tick(stamp(1)).await;
    store.open_batch().await;
    store
        .submit_command(&Command::set_price("SKU-1", Decimal::new(2500, 2)))
        .await
        .unwrap();
    assert_ne!(store.world().await, before);

    assert_eq!(store.discard_batch().await, 1);
    assert_eq!(store.world().await, before);
    assert_eq!(store.discard_batch().await, 0);
    journal.set_write_fault(true);
    assert!(store.commit_batch().await.unwrap().is_empty());
}
