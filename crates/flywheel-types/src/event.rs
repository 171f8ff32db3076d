//! Immutable event records and the closed event variant set.
//!
//! An [`Event`] is the fact that something happened during a run. Events
//! are built by the [`EventFactory`], handed to the journal, and never
//! mutated afterwards: fields are private, there are no setters, and two
//! events compare equal only when their [`EventId`]s match.
//!
//! The payload is a closed sum type, [`EventKind`], so every consumer that
//! matches on it is checked for exhaustiveness at compile time. Each variant
//! maps to exactly one [`EventCategory`] used for routing and filtering.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AgentId, EventId, ProductId, SimulationId};
use crate::review::Review;

/// Errors raised when an event payload violates its structural rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {event_type} event: {reason}")]
pub struct EventValidationError {
    /// Discriminator of the offending event.
    pub event_type: &'static str,
    /// What is wrong with the payload.
    pub reason: String,
}

/// Routing and filtering tag derived from the event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Run and tick lifecycle markers.
    System,
    /// Product registration and price changes.
    Pricing,
    /// Realized sales.
    Sales,
    /// Inventory replenishment.
    Inventory,
    /// Marketing campaigns.
    Marketing,
    /// Customer message handling.
    CustomerService,
    /// Customer reviews.
    Reviews,
}

impl EventCategory {
    /// Stable string form used by the journal.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Pricing => "pricing",
            Self::Sales => "sales",
            Self::Inventory => "inventory",
            Self::Marketing => "marketing",
            Self::CustomerService => "customer_service",
            Self::Reviews => "reviews",
        }
    }

    /// Parse the journal string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "pricing" => Some(Self::Pricing),
            "sales" => Some(Self::Sales),
            "inventory" => Some(Self::Inventory),
            "marketing" => Some(Self::Marketing),
            "customer_service" => Some(Self::CustomerService),
            "reviews" => Some(Self::Reviews),
            _ => None,
        }
    }
}

impl core::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of things that can happen in a run.
///
/// Serialized adjacently tagged: `{"event_type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// A run was started.
    SimulationStarted {
        /// Seed driving every random draw in the run.
        seed: u64,
        /// Configured tick limit (0 = unlimited).
        max_ticks: u64,
    },
    /// A tick began. Always the first event of its tick.
    TickStarted {
        /// Simulated seconds elapsed since the run's start time.
        elapsed_seconds: i64,
    },
    /// A tick finished and everything before this marker is committed.
    TickCompleted {
        /// Commands accepted during the tick.
        commands_accepted: u64,
        /// Commands rejected during the tick.
        commands_rejected: u64,
        /// Handlers that exceeded their timeout.
        timed_out_handlers: Vec<String>,
        /// Handlers that returned an error.
        failed_handlers: Vec<String>,
        /// Handlers skipped after an emergency stop.
        skipped_handlers: Vec<String>,
    },
    /// A product entered the catalog.
    ProductRegistered {
        /// The product.
        product_id: ProductId,
        /// Initial listed price.
        price: Decimal,
        /// Unit cost.
        cost: Decimal,
        /// Initial on-hand units.
        inventory: u64,
    },
    /// The listed price of a product changed.
    PriceChanged {
        /// The product.
        product_id: ProductId,
        /// Price before the change.
        previous_price: Decimal,
        /// Price the submitter asked for.
        requested_price: Decimal,
        /// Price actually applied after clamping.
        new_price: Decimal,
        /// Whether clamping altered the request.
        clamped: bool,
    },
    /// Units of a product were sold.
    SaleRecorded {
        /// The product.
        product_id: ProductId,
        /// Units sold (always positive).
        units_sold: u32,
        /// Price paid per unit.
        unit_price: Decimal,
        /// `unit_price * units_sold`.
        revenue: Decimal,
        /// On-hand units after the sale.
        inventory_after: u64,
    },
    /// Inventory was replenished.
    InventoryRestocked {
        /// The product.
        product_id: ProductId,
        /// Units received.
        units: u32,
        /// Cost per received unit.
        unit_cost: Decimal,
        /// Weighted-average unit cost after the restock.
        new_cost: Decimal,
        /// On-hand units after the restock.
        inventory_after: u64,
    },
    /// A marketing campaign started.
    CampaignLaunched {
        /// The product being promoted.
        product_id: ProductId,
        /// Campaign spend.
        budget: Decimal,
        /// Demand multiplier while active.
        boost: f64,
        /// First tick the campaign is active.
        start_tick: u64,
        /// First tick the campaign is no longer active.
        end_tick: u64,
    },
    /// A customer message received a response.
    CustomerMessageAnswered {
        /// The message being answered.
        message_id: String,
        /// Product the message concerns, if any.
        product_id: Option<ProductId>,
        /// Response text.
        response: String,
    },
    /// A customer review was posted.
    ReviewPosted {
        /// The review.
        review: Review,
    },
    /// The run ended.
    SimulationEnded {
        /// Why the run ended.
        reason: String,
        /// Last tick that was committed.
        final_tick: u64,
    },
}

impl EventKind {
    /// Every discriminator string, in declaration order.
    pub const TYPE_NAMES: [&'static str; 11] = [
        "simulation_started",
        "tick_started",
        "tick_completed",
        "product_registered",
        "price_changed",
        "sale_recorded",
        "inventory_restocked",
        "campaign_launched",
        "customer_message_answered",
        "review_posted",
        "simulation_ended",
    ];

    /// Stable discriminator string (matches the serialized `event_type`).
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::SimulationStarted { .. } => "simulation_started",
            Self::TickStarted { .. } => "tick_started",
            Self::TickCompleted { .. } => "tick_completed",
            Self::ProductRegistered { .. } => "product_registered",
            Self::PriceChanged { .. } => "price_changed",
            Self::SaleRecorded { .. } => "sale_recorded",
            Self::InventoryRestocked { .. } => "inventory_restocked",
            Self::CampaignLaunched { .. } => "campaign_launched",
            Self::CustomerMessageAnswered { .. } => "customer_message_answered",
            Self::ReviewPosted { .. } => "review_posted",
            Self::SimulationEnded { .. } => "simulation_ended",
        }
    }

    /// Category this variant is routed under.
    pub const fn category(&self) -> EventCategory {
        match self {
            Self::SimulationStarted { .. }
            | Self::TickStarted { .. }
            | Self::TickCompleted { .. }
            | Self::SimulationEnded { .. } => EventCategory::System,
            Self::ProductRegistered { .. } | Self::PriceChanged { .. } => EventCategory::Pricing,
            Self::SaleRecorded { .. } => EventCategory::Sales,
            Self::InventoryRestocked { .. } => EventCategory::Inventory,
            Self::CampaignLaunched { .. } => EventCategory::Marketing,
            Self::CustomerMessageAnswered { .. } => EventCategory::CustomerService,
            Self::ReviewPosted { .. } => EventCategory::Reviews,
        }
    }

    /// The product this event concerns, if any.
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::ProductRegistered { product_id, .. }
            | Self::PriceChanged { product_id, .. }
            | Self::SaleRecorded { product_id, .. }
            | Self::InventoryRestocked { product_id, .. }
            | Self::CampaignLaunched { product_id, .. } => Some(product_id),
            Self::CustomerMessageAnswered { product_id, .. } => product_id.as_ref(),
            Self::ReviewPosted { review } => Some(review.product_id()),
            Self::SimulationStarted { .. }
            | Self::TickStarted { .. }
            | Self::TickCompleted { .. }
            | Self::SimulationEnded { .. } => None,
        }
    }

    /// Check the structural rules of the payload.
    ///
    /// The journal calls this before any write; a failing event rejects the
    /// whole batch it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`EventValidationError`] describing the first broken rule.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        let event_type = self.type_name();
        let fail = |reason: &str| {
            Err(EventValidationError {
                event_type,
                reason: reason.to_owned(),
            })
        };

        if self.product_id().is_some_and(ProductId::is_empty) {
            return fail("product_id is empty");
        }

        match self {
            Self::ProductRegistered { price, cost, .. } => {
                if *price <= Decimal::ZERO {
                    return fail("price must be positive");
                }
                if *cost < Decimal::ZERO {
                    return fail("cost must not be negative");
                }
            }
            Self::PriceChanged { new_price, .. } => {
                if *new_price <= Decimal::ZERO {
                    return fail("new_price must be positive");
                }
            }
            Self::SaleRecorded {
                units_sold,
                unit_price,
                revenue,
                ..
            } => {
                if *units_sold == 0 {
                    return fail("units_sold must be positive");
                }
                if *unit_price < Decimal::ZERO {
                    return fail("unit_price must not be negative");
                }
                let expected = unit_price.checked_mul(Decimal::from(*units_sold));
                if expected != Some(*revenue) {
                    return fail("revenue does not equal unit_price * units_sold");
                }
            }
            Self::InventoryRestocked { units, .. } => {
                if *units == 0 {
                    return fail("units must be positive");
                }
            }
            Self::CampaignLaunched {
                boost,
                start_tick,
                end_tick,
                budget,
                ..
            } => {
                if !boost.is_finite() || *boost <= 0.0 {
                    return fail("boost must be a positive finite number");
                }
                if end_tick <= start_tick {
                    return fail("end_tick must be after start_tick");
                }
                if *budget < Decimal::ZERO {
                    return fail("budget must not be negative");
                }
            }
            Self::CustomerMessageAnswered {
                message_id,
                response,
                ..
            } => {
                if message_id.trim().is_empty() {
                    return fail("message_id is empty");
                }
                if response.trim().is_empty() {
                    return fail("response is empty");
                }
            }
            Self::ReviewPosted { review } => {
                if !review.is_valid() {
                    return fail("review rating outside [1.0, 5.0]");
                }
            }
            Self::SimulationStarted { .. }
            | Self::TickStarted { .. }
            | Self::TickCompleted { .. }
            | Self::SimulationEnded { .. } => {}
        }
        Ok(())
    }
}

/// The tick and simulated time an event is stamped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStamp {
    /// Simulation-relative tick.
    pub tick: u64,
    /// Simulated wall-clock time of the tick.
    pub at: DateTime<Utc>,
}

/// An immutable record of something that happened during a run.
#[derive(Debug, Clone)]
pub struct Event {
    event_id: EventId,
    simulation_id: SimulationId,
    tick: u64,
    timestamp: DateTime<Utc>,
    agent_id: Option<AgentId>,
    category: EventCategory,
    kind: EventKind,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Event {
    /// Reassemble an event from stored parts.
    ///
    /// The category is always derived from `kind`; storage layers compare
    /// it against their own copy to detect corruption.
    pub fn from_parts(
        event_id: EventId,
        simulation_id: SimulationId,
        stamp: TickStamp,
        agent_id: Option<AgentId>,
        kind: EventKind,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            event_id,
            simulation_id,
            tick: stamp.tick,
            timestamp: stamp.at,
            agent_id,
            category: kind.category(),
            kind,
            metadata,
        }
    }

    /// Unique event identifier.
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Run this event belongs to.
    pub const fn simulation_id(&self) -> SimulationId {
        self.simulation_id
    }

    /// Tick the event happened in.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated time of the tick. Informational only, never used for ordering.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Acting party, if any.
    pub const fn agent_id(&self) -> Option<&AgentId> {
        self.agent_id.as_ref()
    }

    /// Routing tag.
    pub const fn category(&self) -> EventCategory {
        self.category
    }

    /// Discriminator string.
    pub const fn event_type(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Event payload.
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Free-form context.
    pub const fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for Event {}

impl core::hash::Hash for Event {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

/// Issues deterministic identifiers and stamps events for one run.
///
/// IDs are UUID v5 values over `(simulation_id, sequence)`. The sequence is
/// an atomic counter, so the factory can be shared behind an `Arc` by every
/// component that creates events. As long as events are created in the same
/// order, two runs produce the same IDs.
#[derive(Debug)]
pub struct EventFactory {
    simulation_id: SimulationId,
    next_sequence: AtomicU64,
}

impl EventFactory {
    /// Create a factory for a fresh run.
    pub const fn new(simulation_id: SimulationId) -> Self {
        Self::resume(simulation_id, 0)
    }

    /// Create a factory that continues after `issued` IDs.
    pub const fn resume(simulation_id: SimulationId, issued: u64) -> Self {
        Self {
            simulation_id,
            next_sequence: AtomicU64::new(issued),
        }
    }

    /// Run this factory stamps events for.
    pub const fn simulation_id(&self) -> SimulationId {
        self.simulation_id
    }

    /// Number of IDs issued so far.
    pub fn issued(&self) -> u64 {
        self.next_sequence.load(Ordering::Acquire)
    }

    /// Issue the next identifier.
    pub fn next_uuid(&self) -> Uuid {
        let sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel);
        Uuid::new_v5(&self.simulation_id.into_inner(), &sequence.to_be_bytes())
    }

    /// Build an event with empty metadata.
    pub fn stamp(&self, stamp: TickStamp, agent_id: Option<AgentId>, kind: EventKind) -> Event {
        self.stamp_with_metadata(stamp, agent_id, kind, BTreeMap::new())
    }

    /// Build an event carrying metadata.
    pub fn stamp_with_metadata(
        &self,
        stamp: TickStamp,
        agent_id: Option<AgentId>,
        kind: EventKind,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Event {
        Event::from_parts(
            EventId(self.next_uuid()),
            self.simulation_id,
            stamp,
            agent_id,
            kind,
            metadata,
        )
    }
}
