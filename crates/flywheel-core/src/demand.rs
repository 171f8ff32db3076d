//! Market demand: turns price, visibility and campaigns into orders.
//!
//! Per product and tick the expected demand is
//! `base_units * visibility * price_factor * campaign_boost`, where
//! `price_factor = (reference_price / price) ^ elasticity` and the reference
//! price is `cost * reference_markup`. The realized quantity is a Poisson
//! draw from the tick's demand stream, capped at on-hand inventory.

use async_trait::async_trait;
use flywheel_types::{AgentId, Command, CommandKind, ProductState};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::DemandConfig;
use crate::handler::{HandlerError, TickContext, TickHandler};

/// Stream tag for demand draws.
pub const DEMAND_STREAM: u64 = 0x4445_4D41_4E44;

/// Largest price factor applied, so a near-zero price cannot explode demand.
const MAX_PRICE_FACTOR: f64 = 10.0;

/// Agent recorded on demand-generated orders.
pub const DEMAND_AGENT: &str = "market-demand";

/// Built-in market simulation handler.
#[derive(Debug, Clone)]
pub struct DemandHandler {
    config: DemandConfig,
    agent: AgentId,
}

impl DemandHandler {
    /// Create a handler with the given parameters.
    pub fn new(config: DemandConfig) -> Self {
        Self {
            config,
            agent: AgentId::from(DEMAND_AGENT),
        }
    }

    /// Expected units for one product this tick.
    pub fn expected_units(&self, product: &ProductState, visibility: f64, tick: u64) -> f64 {
        let expected = self.config.base_units_per_tick
            * visibility
            * self.price_factor(product)
            * product.campaign_boost(tick);
        if expected.is_finite() && expected > 0.0 {
            expected
        } else {
            0.0
        }
    }

    /// `(reference / price) ^ elasticity`, neutral when either side is not
    /// positive.
    pub fn price_factor(&self, product: &ProductState) -> f64 {
        if product.cost <= Decimal::ZERO || product.price <= Decimal::ZERO {
            return 1.0;
        }
        let reference = product.cost.saturating_mul(self.config.reference_markup);
        let ratio = reference
            .checked_div(product.price)
            .and_then(|r| r.to_f64())
            .unwrap_or(1.0);
        let factor = ratio.powf(self.config.price_elasticity);
        if factor.is_finite() {
            factor.clamp(0.0, MAX_PRICE_FACTOR)
        } else {
            1.0
        }
    }

    fn realize<R: Rng>(expected: f64, inventory: u64, rng: &mut R) -> u32 {
        let Ok(poisson) = Poisson::new(expected) else {
            return 0;
        };
        let drawn = whole_units(poisson.sample(rng));
        u32::try_from(u64::from(drawn).min(inventory)).unwrap_or(u32::MAX)
    }
}

/// Truncate a non-negative draw to whole units, saturating at `u32::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_units(draw: f64) -> u32 {
    if !draw.is_finite() || draw <= 0.0 {
        0
    } else if draw >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        draw as u32
    }
}

#[async_trait]
impl TickHandler for DemandHandler {
    fn name(&self) -> &str {
        "demand"
    }

    async fn on_tick(&self, context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        let mut rng = context.rng(DEMAND_STREAM);
        let mut orders = Vec::new();
        for product in &context.products {
            let expected =
                self.expected_units(product, context.visibility_of(&product.product_id), context.tick);
            if expected <= 0.0 || product.inventory == 0 {
                continue;
            }
            let quantity = Self::realize(expected, product.inventory, &mut rng);
            if quantity == 0 {
                continue;
            }
            orders.push(Command {
                agent_id: Some(self.agent.clone()),
                kind: CommandKind::PlaceOrder {
                    product_id: product.product_id.clone(),
                    quantity,
                    max_unit_price: Some(product.price),
                },
            });
        }
        Ok(orders)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use flywheel_types::{Campaign, ProductId};

    use super::*;

    fn product(price: i64, cost: i64, inventory: u64) -> ProductState {
        let mut state = ProductState::new(ProductId::from("SKU-1"), 0);
        state.price = Decimal::new(price, 2);
        state.cost = Decimal::new(cost, 2);
        state.inventory = inventory;
        state
    }

    fn context(products: Vec<ProductState>, visibility: f64) -> TickContext {
        let visibility = products
            .iter()
            .map(|p| (p.product_id.clone(), visibility))
            .collect::<BTreeMap<_, _>>();
        TickContext {
            tick: 5,
            at: Utc::now(),
            seed: 42,
            products,
            visibility,
        }
    }

    fn handler() -> DemandHandler {
        DemandHandler::new(DemandConfig {
            enabled: true,
            base_units_per_tick: 5.0,
            price_elasticity: 1.0,
            reference_markup: Decimal::TWO,
        })
    }

    #[test]
    fn reference_price_is_neutral() {
        let h = handler();
        let factor = h.price_factor(&product(2000, 1000, 10));
        assert!((factor - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cheaper_sells_more() {
        let h = handler();
        assert!(h.price_factor(&product(1000, 1000, 10)) > 1.0);
        assert!(h.price_factor(&product(4000, 1000, 10)) < 1.0);
    }

    #[test]
    fn zero_cost_is_neutral() {
        let h = handler();
        let factor = h.price_factor(&product(2000, 0, 10));
        assert!((factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn campaign_and_visibility_scale_demand() {
        let h = handler();
        let mut boosted = product(2000, 1000, 10);
        boosted.campaign = Some(Campaign {
            budget: Decimal::ONE_HUNDRED,
            boost: 2.0,
            start_tick: 0,
            end_tick: 10,
        });
        let plain = h.expected_units(&product(2000, 1000, 10), 1.0, 5);
        let both = h.expected_units(&boosted, 2.0, 5);
        assert!((both - plain * 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn orders_are_capped_by_inventory() {
        let h = DemandHandler::new(DemandConfig {
            base_units_per_tick: 500.0,
            ..handler().config
        });
        let orders = h.on_tick(&context(vec![product(2000, 1000, 3)], 1.0)).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert!(matches!(
            orders[0].kind,
            CommandKind::PlaceOrder { quantity: 3, .. }
        ));
        assert_eq!(orders[0].agent_id.as_ref().unwrap().as_str(), DEMAND_AGENT);
    }

    #[tokio::test]
    async fn empty_shelves_produce_no_orders() {
        let orders = handler()
            .on_tick(&context(vec![product(2000, 1000, 0)], 2.0))
            .await
            .unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn same_tick_same_orders() {
        let ctx = context(vec![product(2000, 1000, 1_000)], 1.0);
        let a = handler().on_tick(&ctx).await.unwrap();
        let b = handler().on_tick(&ctx).await.unwrap();
        assert_eq!(a, b);
    }
}
