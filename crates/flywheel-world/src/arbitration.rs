//! Command arbitration rules.
//!
//! [`arbitrate`] is a pure function from `(world, command)` to either the
//! events the command produces or a [`Rejection`]. It never mutates state:
//! the store journals the events first and only then folds them into the
//! world, so a rejected or unjournaled command has no observable effect.
//!
//! Rules are checked in two passes. Structural validation looks at the
//! command alone; arbitration then checks it against current state.

use flywheel_types::{
    ArbitrationRejected, CommandKind, EventKind, ProductId, ProductState, Rejection,
    ValidationError,
};
use rust_decimal::Decimal;

use crate::config::ArbitrationConfig;
use crate::world::World;

/// Decimal places money is rounded to.
const MONEY_DP: u32 = 2;

/// Decide the events a command produces at `tick`.
///
/// # Errors
///
/// Returns [`Rejection::Invalid`] for malformed commands and
/// [`Rejection::Arbitration`] for commands that conflict with `world`.
pub fn arbitrate(
    world: &World,
    config: &ArbitrationConfig,
    tick: u64,
    command: &CommandKind,
) -> Result<Vec<EventKind>, Rejection> {
    validate(command, config)?;

    let event = match command {
        CommandKind::RegisterProduct {
            product_id,
            price,
            cost,
            inventory,
        } => {
            if world.product(product_id).is_some() {
                return Err(ArbitrationRejected::ProductAlreadyRegistered {
                    product_id: product_id.clone(),
                }
                .into());
            }
            EventKind::ProductRegistered {
                product_id: product_id.clone(),
                price: price.round_dp(MONEY_DP),
                cost: cost.round_dp(MONEY_DP),
                inventory: *inventory,
            }
        }
        CommandKind::SetPrice { product_id, price } => {
            arbitrate_price(world.product(product_id), product_id, config, tick, *price)?
        }
        CommandKind::PlaceOrder {
            product_id,
            quantity,
            max_unit_price,
        } => {
            let product = known(world, product_id)?;
            let requested = u64::from(*quantity);
            if product.inventory < requested {
                return Err(ArbitrationRejected::InsufficientInventory {
                    requested: *quantity,
                    available: product.inventory,
                }
                .into());
            }
            if let Some(limit) = max_unit_price
                && product.price > *limit
            {
                return Err(ArbitrationRejected::PriceAboveLimit {
                    price: product.price,
                    limit: *limit,
                }
                .into());
            }
            let revenue = product
                .price
                .checked_mul(Decimal::from(*quantity))
                .ok_or(ValidationError::ValueOutOfRange { field: "revenue" })?;
            EventKind::SaleRecorded {
                product_id: product_id.clone(),
                units_sold: *quantity,
                unit_price: product.price,
                revenue,
                inventory_after: product.inventory.saturating_sub(requested),
            }
        }
        CommandKind::RestockInventory {
            product_id,
            units,
            unit_cost,
        } => {
            let (on_hand, cost) = world
                .product(product_id)
                .map_or((0, Decimal::ZERO), |p| (p.inventory, p.cost));
            let inventory_after = on_hand
                .checked_add(u64::from(*units))
                .ok_or(ValidationError::ValueOutOfRange { field: "inventory" })?;
            let new_cost = weighted_cost(on_hand, cost, *units, *unit_cost)
                .ok_or(ValidationError::ValueOutOfRange { field: "unit_cost" })?;
            EventKind::InventoryRestocked {
                product_id: product_id.clone(),
                units: *units,
                unit_cost: *unit_cost,
                new_cost,
                inventory_after,
            }
        }
        CommandKind::RunMarketingCampaign {
            product_id,
            budget,
            boost,
            duration_ticks,
        } => {
            let product = known(world, product_id)?;
            if let Some(active) = product.active_campaign(tick) {
                return Err(ArbitrationRejected::CampaignAlreadyActive {
                    ends_at_tick: active.end_tick,
                }
                .into());
            }
            let end_tick = tick
                .checked_add(*duration_ticks)
                .ok_or(ValidationError::ValueOutOfRange {
                    field: "duration_ticks",
                })?;
            EventKind::CampaignLaunched {
                product_id: product_id.clone(),
                budget: budget.round_dp(MONEY_DP),
                boost: *boost,
                start_tick: tick,
                end_tick,
            }
        }
        CommandKind::RespondToCustomerMessage {
            message_id,
            product_id,
            response,
        } => {
            if world.is_answered(message_id) {
                return Err(ArbitrationRejected::MessageAlreadyAnswered {
                    message_id: message_id.clone(),
                }
                .into());
            }
            EventKind::CustomerMessageAnswered {
                message_id: message_id.clone(),
                product_id: product_id.clone(),
                response: response.clone(),
            }
        }
    };
    Ok(vec![event])
}

/// Structural checks that need no state.
///
/// # Errors
///
/// Returns the first broken rule.
pub fn validate(command: &CommandKind, config: &ArbitrationConfig) -> Result<(), ValidationError> {
    if command.product_id().is_some_and(ProductId::is_empty) {
        return Err(ValidationError::EmptyField {
            field: "product_id",
        });
    }

    match command {
        CommandKind::RegisterProduct { price, cost, .. } => {
            positive_price(*price)?;
            if *cost < Decimal::ZERO {
                return Err(ValidationError::NegativeCost { cost: *cost });
            }
        }
        CommandKind::SetPrice { price, .. } => positive_price(*price)?,
        CommandKind::PlaceOrder {
            quantity,
            max_unit_price,
            ..
        } => {
            if *quantity == 0 {
                return Err(ValidationError::ZeroQuantity { field: "quantity" });
            }
            if let Some(limit) = max_unit_price {
                positive_price(*limit)?;
            }
        }
        CommandKind::RestockInventory {
            units, unit_cost, ..
        } => {
            if *units == 0 {
                return Err(ValidationError::ZeroQuantity { field: "units" });
            }
            if *unit_cost < Decimal::ZERO {
                return Err(ValidationError::NegativeCost { cost: *unit_cost });
            }
        }
        CommandKind::RunMarketingCampaign {
            budget,
            boost,
            duration_ticks,
            ..
        } => {
            if *budget < Decimal::ZERO {
                return Err(ValidationError::NegativeBudget { budget: *budget });
            }
            if !boost.is_finite() || *boost <= 1.0 || *boost > config.max_campaign_boost {
                return Err(ValidationError::BoostOutOfRange {
                    boost: *boost,
                    max: config.max_campaign_boost,
                });
            }
            if *duration_ticks == 0 || *duration_ticks > config.max_campaign_ticks {
                return Err(ValidationError::InvalidDuration {
                    ticks: *duration_ticks,
                    max: config.max_campaign_ticks,
                });
            }
        }
        CommandKind::RespondToCustomerMessage {
            message_id,
            response,
            ..
        } => {
            if message_id.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "message_id",
                });
            }
            if response.trim().is_empty() {
                return Err(ValidationError::EmptyField { field: "response" });
            }
        }
    }
    Ok(())
}

fn positive_price(price: Decimal) -> Result<(), ValidationError> {
    if price <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice { price });
    }
    Ok(())
}

fn known<'a>(world: &'a World, product_id: &ProductId) -> Result<&'a ProductState, Rejection> {
    world.product(product_id).ok_or_else(|| {
        ArbitrationRejected::UnknownProduct {
            product_id: product_id.clone(),
        }
        .into()
    })
}

/// Price rule: reject below the cost floor, otherwise clamp to the
/// per-tick band around the tick-open price and lift back to the floor.
fn arbitrate_price(
    product: Option<&ProductState>,
    product_id: &ProductId,
    config: &ArbitrationConfig,
    tick: u64,
    requested: Decimal,
) -> Result<EventKind, Rejection> {
    let (previous, reference, floor) = product.map_or(
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        |p| {
            (
                p.price,
                p.reference_price(tick),
                p.cost_floor(config.cost_floor_multiplier),
            )
        },
    );

    if requested < floor {
        return Err(ArbitrationRejected::PriceBelowCostFloor { requested, floor }.into());
    }

    let mut new_price = requested;
    if reference > Decimal::ZERO {
        let band = reference
            .checked_mul(config.max_price_change_per_tick.abs())
            .unwrap_or(Decimal::MAX);
        let low = reference.saturating_sub(band);
        let high = reference.saturating_add(band);
        new_price = new_price.clamp(low, high);
    }
    new_price = new_price.max(floor).round_dp(MONEY_DP);
    if new_price <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice { price: requested }.into());
    }

    Ok(EventKind::PriceChanged {
        product_id: product_id.clone(),
        previous_price: previous,
        requested_price: requested,
        new_price,
        clamped: new_price != requested,
    })
}

/// Weighted-average unit cost after receiving `units` at `unit_cost`.
fn weighted_cost(on_hand: u64, cost: Decimal, units: u32, unit_cost: Decimal) -> Option<Decimal> {
    let held = Decimal::from(on_hand).checked_mul(cost.max(Decimal::ZERO))?;
    let received = Decimal::from(units).checked_mul(unit_cost)?;
    let total_units = Decimal::from(on_hand).checked_add(Decimal::from(units))?;
    let total_cost = held.checked_add(received)?;
    Some(total_cost.checked_div(total_units)?.round_dp(MONEY_DP))
}
