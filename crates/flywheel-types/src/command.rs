//! Commands: requests to change world state.
//!
//! A [`Command`] is intent, not fact. The world store either accepts it,
//! producing events, or rejects it with a [`Rejection`] and no observable
//! effect. Rejections are values returned to the submitter, never panics
//! or errors that halt the run.
//!
//! Two rejection families exist:
//!
//! - [`ValidationError`] -- the command is malformed on its own (zero
//!   quantity, non-positive price). Checked before looking at any state.
//! - [`ArbitrationRejected`] -- the command is well formed but violates a
//!   domain invariant given current state (insufficient inventory, price
//!   below the cost floor).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::ids::{AgentId, ProductId};

/// The closed set of state-changing requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command_type", content = "parameters", rename_all = "snake_case")]
pub enum CommandKind {
    /// Add a product to the catalog.
    RegisterProduct {
        /// The product.
        product_id: ProductId,
        /// Initial listed price.
        price: Decimal,
        /// Unit cost.
        cost: Decimal,
        /// Initial on-hand units.
        inventory: u64,
    },
    /// Change the listed price.
    SetPrice {
        /// The product.
        product_id: ProductId,
        /// Requested price.
        price: Decimal,
    },
    /// Buy units at the current listed price.
    PlaceOrder {
        /// The product.
        product_id: ProductId,
        /// Units requested.
        quantity: u32,
        /// Highest unit price the buyer accepts.
        #[serde(default)]
        max_unit_price: Option<Decimal>,
    },
    /// Receive units into inventory.
    RestockInventory {
        /// The product.
        product_id: ProductId,
        /// Units received.
        units: u32,
        /// Cost per received unit.
        unit_cost: Decimal,
    },
    /// Start a marketing campaign.
    RunMarketingCampaign {
        /// The product to promote.
        product_id: ProductId,
        /// Campaign spend.
        budget: Decimal,
        /// Demand multiplier while active.
        boost: f64,
        /// How many ticks the campaign runs.
        duration_ticks: u64,
    },
    /// Answer a customer message.
    RespondToCustomerMessage {
        /// The message being answered.
        message_id: String,
        /// Product the message concerns, if any.
        #[serde(default)]
        product_id: Option<ProductId>,
        /// Response text.
        response: String,
    },
}

impl CommandKind {
    /// Stable discriminator string.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::RegisterProduct { .. } => "register_product",
            Self::SetPrice { .. } => "set_price",
            Self::PlaceOrder { .. } => "place_order",
            Self::RestockInventory { .. } => "restock_inventory",
            Self::RunMarketingCampaign { .. } => "run_marketing_campaign",
            Self::RespondToCustomerMessage { .. } => "respond_to_customer_message",
        }
    }

    /// The product this command targets, if any.
    pub const fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::RegisterProduct { product_id, .. }
            | Self::SetPrice { product_id, .. }
            | Self::PlaceOrder { product_id, .. }
            | Self::RestockInventory { product_id, .. }
            | Self::RunMarketingCampaign { product_id, .. } => Some(product_id),
            Self::RespondToCustomerMessage { product_id, .. } => product_id.as_ref(),
        }
    }
}

/// A request to change state, attributed to an acting party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Who submitted the command, if known.
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// What is being requested.
    pub kind: CommandKind,
}

impl Command {
    /// An unattributed command.
    pub const fn new(kind: CommandKind) -> Self {
        Self {
            agent_id: None,
            kind,
        }
    }

    /// Attribute the command to an agent.
    #[must_use]
    pub fn by(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Shorthand for [`CommandKind::SetPrice`].
    pub fn set_price(product_id: impl Into<ProductId>, price: Decimal) -> Self {
        Self::new(CommandKind::SetPrice {
            product_id: product_id.into(),
            price,
        })
    }

    /// Shorthand for [`CommandKind::PlaceOrder`] with no price limit.
    pub fn place_order(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self::new(CommandKind::PlaceOrder {
            product_id: product_id.into(),
            quantity,
            max_unit_price: None,
        })
    }

    /// Shorthand for [`CommandKind::RegisterProduct`].
    pub fn register(
        product_id: impl Into<ProductId>,
        price: Decimal,
        cost: Decimal,
        inventory: u64,
    ) -> Self {
        Self::new(CommandKind::RegisterProduct {
            product_id: product_id.into(),
            price,
            cost,
            inventory,
        })
    }

    /// Shorthand for [`CommandKind::RestockInventory`].
    pub fn restock(product_id: impl Into<ProductId>, units: u32, unit_cost: Decimal) -> Self {
        Self::new(CommandKind::RestockInventory {
            product_id: product_id.into(),
            units,
            unit_cost,
        })
    }
}

/// A command that is malformed regardless of world state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Price is zero or negative.
    #[error("price {price} must be positive")]
    NonPositivePrice {
        /// The offending price.
        price: Decimal,
    },
    /// Cost is negative.
    #[error("cost {cost} must not be negative")]
    NegativeCost {
        /// The offending cost.
        cost: Decimal,
    },
    /// Budget is negative.
    #[error("budget {budget} must not be negative")]
    NegativeBudget {
        /// The offending budget.
        budget: Decimal,
    },
    /// A unit count is zero.
    #[error("{field} must be positive")]
    ZeroQuantity {
        /// Which field.
        field: &'static str,
    },
    /// Campaign boost is outside `(1.0, max]` or not finite.
    #[error("campaign boost {boost} outside (1.0, {max}]")]
    BoostOutOfRange {
        /// The offending boost.
        boost: f64,
        /// Configured upper bound.
        max: f64,
    },
    /// Campaign duration is zero or too long.
    #[error("campaign duration {ticks} outside [1, {max}] ticks")]
    InvalidDuration {
        /// The offending duration.
        ticks: u64,
        /// Configured upper bound.
        max: u64,
    },
    /// A required text field is blank.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Which field.
        field: &'static str,
    },
    /// Applying the command would overflow a counter or amount.
    #[error("{field} out of representable range")]
    ValueOutOfRange {
        /// Which field.
        field: &'static str,
    },
}

impl ValidationError {
    /// Stable reason code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NonPositivePrice { .. } => "non_positive_price",
            Self::NegativeCost { .. } => "negative_cost",
            Self::NegativeBudget { .. } => "negative_budget",
            Self::ZeroQuantity { .. } => "zero_quantity",
            Self::BoostOutOfRange { .. } => "boost_out_of_range",
            Self::InvalidDuration { .. } => "invalid_duration",
            Self::EmptyField { .. } => "empty_field",
            Self::ValueOutOfRange { .. } => "value_out_of_range",
        }
    }
}

/// A well-formed command that conflicts with current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbitrationRejected {
    /// The product has never been referenced.
    #[error("unknown product {product_id}")]
    UnknownProduct {
        /// The product.
        product_id: ProductId,
    },
    /// The product is already in the catalog.
    #[error("product {product_id} is already registered")]
    ProductAlreadyRegistered {
        /// The product.
        product_id: ProductId,
    },
    /// Not enough units on hand.
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Units requested.
        requested: u32,
        /// Units on hand.
        available: u64,
    },
    /// Requested price is below the cost floor.
    #[error("price {requested} below cost floor {floor}")]
    PriceBelowCostFloor {
        /// Requested price.
        requested: Decimal,
        /// Lowest acceptable price.
        floor: Decimal,
    },
    /// Listed price exceeds the buyer's limit.
    #[error("price {price} above buyer limit {limit}")]
    PriceAboveLimit {
        /// Current listed price.
        price: Decimal,
        /// Buyer's limit.
        limit: Decimal,
    },
    /// Another campaign is still running.
    #[error("campaign already active until tick {ends_at_tick}")]
    CampaignAlreadyActive {
        /// First tick the running campaign ends.
        ends_at_tick: u64,
    },
    /// The message already has a response.
    #[error("message {message_id} already answered")]
    MessageAlreadyAnswered {
        /// The message.
        message_id: String,
    },
}

impl ArbitrationRejected {
    /// Stable reason code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownProduct { .. } => "unknown_product",
            Self::ProductAlreadyRegistered { .. } => "product_already_registered",
            Self::InsufficientInventory { .. } => "insufficient_inventory",
            Self::PriceBelowCostFloor { .. } => "price_below_cost_floor",
            Self::PriceAboveLimit { .. } => "price_above_limit",
            Self::CampaignAlreadyActive { .. } => "campaign_already_active",
            Self::MessageAlreadyAnswered { .. } => "message_already_answered",
        }
    }
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// Malformed command.
    #[error("validation failed: {0}")]
    Invalid(#[from] ValidationError),
    /// Domain invariant violated.
    #[error("arbitration rejected: {0}")]
    Arbitration(#[from] ArbitrationRejected),
}

impl Rejection {
    /// Stable reason code shown to the submitting agent.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Invalid(e) => e.code(),
            Self::Arbitration(e) => e.code(),
        }
    }
}

/// Result of submitting a command to the world store.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Applied atomically; these events were journaled.
    Accepted(Vec<Event>),
    /// Not applied; no events exist for this command.
    Rejected(Rejection),
}

impl CommandOutcome {
    /// Whether the command was applied.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Events produced, empty when rejected.
    pub fn events(&self) -> &[Event] {
        match self {
            Self::Accepted(events) => events,
            Self::Rejected(_) => &[],
        }
    }

    /// The rejection, if any.
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn command_parses_from_tagged_json() {
        let json = r#"{
            "agent_id": "pricing-bot",
            "kind": {
                "command_type": "set_price",
                "parameters": { "product_id": "SKU-1", "price": "19.99" }
            }
        }"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert_eq!(command.agent_id, Some(AgentId::new("pricing-bot")));
        assert_eq!(command.kind.type_name(), "set_price");
        assert_eq!(command.kind.product_id(), Some(&ProductId::new("SKU-1")));
    }

    #[test]
    fn rejection_codes_are_stable() {
        let r = Rejection::from(ArbitrationRejected::InsufficientInventory {
            requested: 5,
            available: 2,
        });
        assert_eq!(r.code(), "insufficient_inventory");
        let v = Rejection::from(ValidationError::ZeroQuantity { field: "quantity" });
        assert_eq!(v.code(), "zero_quantity");
    }

    #[test]
    fn rejected_outcome_has_no_events() {
        let outcome = CommandOutcome::Rejected(Rejection::from(ValidationError::EmptyField {
            field: "response",
        }));
        assert!(!outcome.is_accepted());
        assert!(outcome.events().is_empty());
        assert!(outcome.rejection().is_some());
    }
}
