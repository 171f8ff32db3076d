//! The world reducer.
//!
//! [`World`] is a pure fold over journaled events. The store applies each
//! event right after the journal accepts it, and replay applies the same
//! events in journal order, so both paths reach identical state.

use std::collections::{BTreeMap, BTreeSet};

use flywheel_types::{Campaign, Event, EventId, EventKind, ProductId, ProductState};
use serde::{Deserialize, Serialize};

/// Raised when an event cannot be applied to the current state.
///
/// During a live run this means the store and its own arbitration disagree;
/// during replay it means the history does not describe a valid run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReduceError {
    /// The event refers to a product that does not exist yet.
    #[error("event {event_id} refers to unknown product {product_id}")]
    UnknownProduct {
        /// The event.
        event_id: EventId,
        /// The missing product.
        product_id: ProductId,
    },

    /// A product was registered twice.
    #[error("event {event_id} registers existing product {product_id}")]
    AlreadyRegistered {
        /// The event.
        event_id: EventId,
        /// The product.
        product_id: ProductId,
    },

    /// The event's recorded result disagrees with the state it applies to.
    #[error("event {event_id} is inconsistent with state: {reason}")]
    Inconsistent {
        /// The event.
        event_id: EventId,
        /// What disagrees.
        reason: String,
    },
}

/// All canonical per-product records plus answered customer messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct World {
    products: BTreeMap<ProductId, ProductState>,
    answered_messages: BTreeSet<String>,
}

impl World {
    /// An empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for one product.
    pub fn product(&self, product_id: &ProductId) -> Option<&ProductState> {
        self.products.get(product_id)
    }

    /// Every product in key order.
    pub fn products(&self) -> impl Iterator<Item = &ProductState> {
        self.products.values()
    }

    /// Number of known products.
    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Whether a customer message already has a response.
    pub fn is_answered(&self, message_id: &str) -> bool {
        self.answered_messages.contains(message_id)
    }

    /// Apply one journaled event.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError`] if the event does not fit the current state.
    /// The world is left unchanged in that case.
    pub fn apply(&mut self, event: &Event) -> Result<(), ReduceError> {
        let tick = event.tick();
        let event_id = event.event_id();

        match event.kind() {
            EventKind::ProductRegistered {
                product_id,
                price,
                cost,
                inventory,
            } => {
                if self.products.contains_key(product_id) {
                    return Err(ReduceError::AlreadyRegistered {
                        event_id,
                        product_id: product_id.clone(),
                    });
                }
                let mut product = ProductState::new(product_id.clone(), tick);
                product.price = *price;
                product.tick_open_price = *price;
                product.cost = *cost;
                product.inventory = *inventory;
                self.products.insert(product_id.clone(), product);
            }
            EventKind::PriceChanged {
                product_id,
                new_price,
                ..
            } => {
                let product = self
                    .products
                    .entry(product_id.clone())
                    .or_insert_with(|| ProductState::new(product_id.clone(), tick));
                if product.price_tick != tick {
                    product.tick_open_price = product.price;
                    product.price_tick = tick;
                }
                product.price = *new_price;
                product.updated_tick = tick;
            }
            EventKind::SaleRecorded {
                product_id,
                units_sold,
                revenue,
                inventory_after,
                ..
            } => {
                let product = existing(&mut self.products, event_id, product_id)?;
                let remaining = product.inventory.checked_sub(u64::from(*units_sold));
                if remaining != Some(*inventory_after) {
                    return Err(ReduceError::Inconsistent {
                        event_id,
                        reason: format!(
                            "selling {units_sold} of {} does not leave {inventory_after}",
                            product.inventory
                        ),
                    });
                }
                product.inventory = *inventory_after;
                product.units_sold = product.units_sold.saturating_add(u64::from(*units_sold));
                product.revenue = product.revenue.saturating_add(*revenue);
                product.updated_tick = tick;
            }
            EventKind::InventoryRestocked {
                product_id,
                units,
                new_cost,
                inventory_after,
                ..
            } => {
                let on_hand = self.products.get(product_id).map_or(0, |p| p.inventory);
                if on_hand.checked_add(u64::from(*units)) != Some(*inventory_after) {
                    return Err(ReduceError::Inconsistent {
                        event_id,
                        reason: format!(
                            "receiving {units} onto {on_hand} does not give {inventory_after}"
                        ),
                    });
                }
                let product = self
                    .products
                    .entry(product_id.clone())
                    .or_insert_with(|| ProductState::new(product_id.clone(), tick));
                product.inventory = *inventory_after;
                product.cost = *new_cost;
                product.updated_tick = tick;
            }
            EventKind::CampaignLaunched {
                product_id,
                budget,
                boost,
                start_tick,
                end_tick,
            } => {
                let product = existing(&mut self.products, event_id, product_id)?;
                product.campaign = Some(Campaign {
                    budget: *budget,
                    boost: *boost,
                    start_tick: *start_tick,
                    end_tick: *end_tick,
                });
                product.updated_tick = tick;
            }
            EventKind::CustomerMessageAnswered { message_id, .. } => {
                self.answered_messages.insert(message_id.clone());
            }
            EventKind::SimulationStarted { .. }
            | EventKind::TickStarted { .. }
            | EventKind::TickCompleted { .. }
            | EventKind::ReviewPosted { .. }
            | EventKind::SimulationEnded { .. } => {}
        }
        Ok(())
    }
}

fn existing<'a>(
    products: &'a mut BTreeMap<ProductId, ProductState>,
    event_id: EventId,
    product_id: &ProductId,
) -> Result<&'a mut ProductState, ReduceError> {
    products
        .get_mut(product_id)
        .ok_or_else(|| ReduceError::UnknownProduct {
            event_id,
            product_id: product_id.clone(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use flywheel_types::{EventFactory, SimulationId, TickStamp};
    use rust_decimal::Decimal;

    use super::*;

    fn at(factory: &EventFactory, tick: u64, kind: EventKind) -> Event {
        let stamp = TickStamp {
            tick,
            at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        factory.stamp(stamp, None, kind)
    }

    fn registered(factory: &EventFactory) -> World {
        let mut world = World::new();
        world
            .apply(&at(
                factory,
                0,
                EventKind::ProductRegistered {
                    product_id: ProductId::new("SKU-1"),
                    price: Decimal::new(2000, 2),
                    cost: Decimal::new(1000, 2),
                    inventory: 100,
                },
            ))
            .unwrap();
        world
    }

    fn price_change(factory: &EventFactory, tick: u64, new_price: Decimal) -> Event {
        at(
            factory,
            tick,
            EventKind::PriceChanged {
                product_id: ProductId::new("SKU-1"),
                previous_price: Decimal::ZERO,
                requested_price: new_price,
                new_price,
                clamped: false,
            },
        )
    }

    #[test]
    fn price_changes_track_the_tick_open_price() {
        let factory = EventFactory::new(SimulationId::derive("world", 1));
        let mut world = registered(&factory);
        let id = ProductId::new("SKU-1");

        world.apply(&price_change(&factory, 3, Decimal::new(2500, 2))).unwrap();
        world.apply(&price_change(&factory, 3, Decimal::new(2800, 2))).unwrap();
        let product = world.product(&id).unwrap();
        assert_eq!(product.price, Decimal::new(2800, 2));
        assert_eq!(product.reference_price(3), Decimal::new(2000, 2));

        world.apply(&price_change(&factory, 4, Decimal::new(2600, 2))).unwrap();
        let product = world.product(&id).unwrap();
        assert_eq!(product.reference_price(4), Decimal::new(2800, 2));
    }

    #[test]
    fn sale_must_match_recorded_inventory() {
        let factory = EventFactory::new(SimulationId::derive("world", 2));
        let mut world = registered(&factory);
        let bad = at(
            &factory,
            1,
            EventKind::SaleRecorded {
                product_id: ProductId::new("SKU-1"),
                units_sold: 10,
                unit_price: Decimal::new(2000, 2),
                revenue: Decimal::new(20000, 2),
                inventory_after: 95,
            },
        );
        let before = world.clone();
        assert!(matches!(world.apply(&bad), Err(ReduceError::Inconsistent { .. })));
        assert_eq!(world, before);
    }

    #[test]
    fn sale_of_unknown_product_is_rejected() {
        let factory = EventFactory::new(SimulationId::derive("world", 3));
        let mut world = World::new();
        let sale = at(
            &factory,
            1,
            EventKind::SaleRecorded {
                product_id: ProductId::new("ghost"),
                units_sold: 1,
                unit_price: Decimal::ONE,
                revenue: Decimal::ONE,
                inventory_after: 0,
            },
        );
        assert!(matches!(world.apply(&sale), Err(ReduceError::UnknownProduct { .. })));
    }

    #[test]
    fn restock_creates_product_on_first_reference() {
        let factory = EventFactory::new(SimulationId::derive("world", 4));
        let mut world = World::new();
        world
            .apply(&at(
                &factory,
                2,
                EventKind::InventoryRestocked {
                    product_id: ProductId::new("new"),
                    units: 5,
                    unit_cost: Decimal::new(300, 2),
                    new_cost: Decimal::new(300, 2),
                    inventory_after: 5,
                },
            ))
            .unwrap();
        let product = world.product(&ProductId::new("new")).unwrap();
        assert_eq!(product.inventory, 5);
        assert_eq!(product.created_tick, 2);
    }
}
