//! The canonical per-product world record.
//!
//! A [`ProductState`] is owned by the world store. Everything outside the
//! store only ever sees clones returned from snapshot reads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::ProductId;

/// An active or finished marketing campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign spend.
    pub budget: Decimal,
    /// Demand multiplier while active.
    pub boost: f64,
    /// First tick the campaign is active.
    pub start_tick: u64,
    /// First tick the campaign is no longer active.
    pub end_tick: u64,
}

impl Campaign {
    /// Whether the campaign covers `tick`.
    pub const fn is_active(&self, tick: u64) -> bool {
        tick >= self.start_tick && tick < self.end_tick
    }
}

/// Canonical state of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    /// Product key.
    pub product_id: ProductId,
    /// Current listed price.
    pub price: Decimal,
    /// Weighted-average unit cost.
    pub cost: Decimal,
    /// On-hand units.
    pub inventory: u64,
    /// Lifetime units sold.
    pub units_sold: u64,
    /// Lifetime revenue.
    pub revenue: Decimal,
    /// Price at the start of `price_tick`, the reference for the
    /// per-tick change limit.
    pub tick_open_price: Decimal,
    /// Tick of the most recent price change.
    pub price_tick: u64,
    /// Most recent campaign, if any.
    pub campaign: Option<Campaign>,
    /// Tick the record was created.
    pub created_tick: u64,
    /// Tick of the most recent change.
    pub updated_tick: u64,
}

impl ProductState {
    /// A fresh record created on first reference to a product.
    pub const fn new(product_id: ProductId, tick: u64) -> Self {
        Self {
            product_id,
            price: Decimal::ZERO,
            cost: Decimal::ZERO,
            inventory: 0,
            units_sold: 0,
            revenue: Decimal::ZERO,
            tick_open_price: Decimal::ZERO,
            price_tick: tick,
            campaign: None,
            created_tick: tick,
            updated_tick: tick,
        }
    }

    /// Lowest price arbitration accepts: `max(cost, 0) * multiplier`.
    pub fn cost_floor(&self, multiplier: Decimal) -> Decimal {
        let cost = self.cost.max(Decimal::ZERO);
        cost.checked_mul(multiplier).unwrap_or(Decimal::MAX)
    }

    /// Price the per-tick change limit is measured against at `tick`.
    pub fn reference_price(&self, tick: u64) -> Decimal {
        if self.price_tick == tick {
            self.tick_open_price
        } else {
            self.price
        }
    }

    /// The campaign active at `tick`, if any.
    pub fn active_campaign(&self, tick: u64) -> Option<&Campaign> {
        self.campaign.as_ref().filter(|c| c.is_active(tick))
    }

    /// Demand multiplier from the active campaign (1.0 when none).
    pub fn campaign_boost(&self, tick: u64) -> f64 {
        self.active_campaign(tick).map_or(1.0, |c| c.boost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_floor_ignores_negative_cost() {
        let mut product = ProductState::new(ProductId::new("SKU-1"), 0);
        product.cost = Decimal::new(-500, 2);
        assert_eq!(product.cost_floor(Decimal::ONE), Decimal::ZERO);

        product.cost = Decimal::new(1000, 2);
        assert_eq!(product.cost_floor(Decimal::new(11, 1)), Decimal::new(1100, 2));
    }

    #[test]
    fn reference_price_tracks_tick_open() {
        let mut product = ProductState::new(ProductId::new("SKU-1"), 0);
        product.price = Decimal::new(2500, 2);
        product.tick_open_price = Decimal::new(2000, 2);
        product.price_tick = 4;
        assert_eq!(product.reference_price(4), Decimal::new(2000, 2));
        assert_eq!(product.reference_price(5), Decimal::new(2500, 2));
    }

    #[test]
    fn campaign_window_is_half_open() {
        let mut product = ProductState::new(ProductId::new("SKU-1"), 0);
        product.campaign = Some(Campaign {
            budget: Decimal::ONE_HUNDRED,
            boost: 1.5,
            start_tick: 3,
            end_tick: 5,
        });
        assert!(product.active_campaign(2).is_none());
        assert!(product.active_campaign(3).is_some());
        assert!(product.active_campaign(4).is_some());
        assert!(product.active_campaign(5).is_none());
        assert!((product.campaign_boost(4) - 1.5).abs() < f64::EPSILON);
    }
}
