//! Arbitration limits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Domain limits the world store enforces when arbitrating commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    /// Prices below `cost * multiplier` are rejected.
    #[serde(default = "default_cost_floor_multiplier")]
    pub cost_floor_multiplier: Decimal,
    /// Largest fractional move away from the tick-open price in one tick.
    #[serde(default = "default_max_price_change")]
    pub max_price_change_per_tick: Decimal,
    /// Upper bound for a campaign's demand multiplier.
    #[serde(default = "default_max_campaign_boost")]
    pub max_campaign_boost: f64,
    /// Longest campaign in ticks.
    #[serde(default = "default_max_campaign_ticks")]
    pub max_campaign_ticks: u64,
}

const fn default_cost_floor_multiplier() -> Decimal {
    Decimal::ONE
}

const fn default_max_price_change() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 1)
}

const fn default_max_campaign_boost() -> f64 {
    3.0
}

const fn default_max_campaign_ticks() -> u64 {
    90
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            cost_floor_multiplier: default_cost_floor_multiplier(),
            max_price_change_per_tick: default_max_price_change(),
            max_campaign_boost: default_max_campaign_boost(),
            max_campaign_ticks: default_max_campaign_ticks(),
        }
    }
}

impl ArbitrationConfig {
    /// Describe the first nonsensical value, if any.
    pub fn problems(&self) -> Option<String> {
        if self.cost_floor_multiplier < Decimal::ZERO {
            return Some(format!(
                "cost_floor_multiplier {} must not be negative",
                self.cost_floor_multiplier
            ));
        }
        if self.max_price_change_per_tick <= Decimal::ZERO {
            return Some(format!(
                "max_price_change_per_tick {} must be positive",
                self.max_price_change_per_tick
            ));
        }
        if !self.max_campaign_boost.is_finite() || self.max_campaign_boost <= 1.0 {
            return Some(format!(
                "max_campaign_boost {} must be greater than 1.0",
                self.max_campaign_boost
            ));
        }
        if self.max_campaign_ticks == 0 {
            return Some(String::from("max_campaign_ticks must be positive"));
        }
        None
    }
}
