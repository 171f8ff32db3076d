//! Rebuild a run's state from its journal.
//!
//! Replay folds the full ordered history through the same reducers the
//! live run uses: [`World::apply`] for world state and
//! [`MarketRankingEngine::observe`] for rankings. Nothing is re-sampled;
//! reviews come back exactly as they were journaled.

use std::collections::BTreeMap;

use flywheel_journal::{EventJournal, HistoryQuery, JournalError};
use flywheel_market::{MarketRankingEngine, ProductRankingState, RankingConfig};
use flywheel_types::{Event, ProductId, SimulationId};
use flywheel_world::{ReduceError, World};

/// Errors raised while replaying a journal.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The history could not be read or decoded.
    #[error("journal read failed: {0}")]
    Journal(#[from] JournalError),

    /// A journaled event does not apply to the state built so far.
    #[error("history does not reduce: {0}")]
    Reduce(#[from] ReduceError),

    /// Live state and replayed state differ.
    #[error("replayed state diverges from live state after tick {tick}")]
    Diverged {
        /// Last tick of the replayed history.
        tick: u64,
    },
}

/// World and ranking state as of some point in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedState {
    /// Every product record and the answered-message set.
    pub world: World,
    /// Every ranking record, in product order.
    pub rankings: BTreeMap<ProductId, ProductRankingState>,
    /// Tick of the last folded event, if any.
    pub last_tick: Option<u64>,
}

/// Fold already-loaded events into fresh state.
///
/// # Errors
///
/// Returns [`ReplayError::Reduce`] if an event does not apply.
pub fn fold<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    ranking: RankingConfig,
) -> Result<ReplayedState, ReplayError> {
    let mut world = World::new();
    let mut engine = MarketRankingEngine::new(ranking);
    let mut last_tick = None;
    for event in events {
        world.apply(event)?;
        engine.observe(event);
        last_tick = Some(event.tick());
    }
    Ok(ReplayedState {
        world,
        rankings: engine.snapshot(),
        last_tick,
    })
}

/// Read a run's full history and fold it.
///
/// # Errors
///
/// Returns [`ReplayError::Journal`] if the history cannot be read (including
/// records that fail to decode) and [`ReplayError::Reduce`] if it does not
/// apply.
pub async fn replay(
    journal: &dyn EventJournal,
    simulation_id: SimulationId,
    ranking: RankingConfig,
) -> Result<ReplayedState, ReplayError> {
    let history = journal
        .get_history(simulation_id, &HistoryQuery::new())
        .await?;
    let state = fold(&history, ranking)?;
    tracing::debug!(
        simulation_id = %simulation_id,
        events = history.len(),
        last_tick = state.last_tick,
        "Replayed journal"
    );
    Ok(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{TimeZone, Utc};
    use flywheel_journal::MemoryJournal;
    use flywheel_types::{EventFactory, EventKind, TickStamp};
    use rust_decimal::Decimal;

    use super::*;

    fn stamp(tick: u64) -> TickStamp {
        TickStamp {
            tick,
            at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn replays_sales_into_world_and_rankings() {
        let run = SimulationId::derive("replay", 1);
        let factory = EventFactory::new(run);
        let journal = MemoryJournal::new();
        journal.initialize().await.unwrap();
        let events = vec![
            factory.stamp(
                stamp(0),
                None,
                EventKind::ProductRegistered {
                    product_id: ProductId::from("SKU-1"),
                    price: Decimal::new(2000, 2),
                    cost: Decimal::new(1000, 2),
                    inventory: 100,
                },
            ),
            factory.stamp(
                stamp(1),
                None,
                EventKind::SaleRecorded {
                    product_id: ProductId::from("SKU-1"),
                    units_sold: 4,
                    unit_price: Decimal::new(2000, 2),
                    revenue: Decimal::new(8000, 2),
                    inventory_after: 96,
                },
            ),
        ];
        journal.append_batch(&events).await.unwrap();

        let state = replay(&journal, run, RankingConfig::default()).await.unwrap();
        let product = state.world.product(&ProductId::from("SKU-1")).unwrap();
        assert_eq!(product.inventory, 96);
        assert_eq!(state.rankings[&ProductId::from("SKU-1")].total_sales, 4);
        assert_eq!(state.last_tick, Some(1));
        assert_eq!(state, fold(&events, RankingConfig::default()).unwrap());
    }

    #[tokio::test]
    async fn unknown_product_sale_does_not_reduce() {
        let run = SimulationId::derive("replay", 2);
        let factory = EventFactory::new(run);
        let sale = factory.stamp(
            stamp(1),
            None,
            EventKind::SaleRecorded {
                product_id: ProductId::from("GHOST"),
                units_sold: 1,
                unit_price: Decimal::ONE,
                revenue: Decimal::ONE,
                inventory_after: 0,
            },
        );
        let result = fold([&sale], RankingConfig::default());
        assert!(matches!(result, Err(ReplayError::Reduce(_))));
    }
}
