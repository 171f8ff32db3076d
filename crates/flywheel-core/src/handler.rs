//! Tick-scoped handler trait and the context handlers read.
//!
//! Each tick the orchestrator presents every registered [`TickHandler`]
//! with the same read-only [`TickContext`] and awaits the commands it
//! wants submitted. Handlers run concurrently, each bounded by the
//! configured timeout, but their commands are submitted afterwards in
//! registration order. A handler therefore never touches the world store
//! directly, and a timed-out handler leaves nothing behind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flywheel_market::derive_seed;
use flywheel_types::{Command, ProductId, ProductState, TickStamp};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Errors a handler may report for one tick.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler could not produce its commands this tick.
    #[error("handler failed: {reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

/// Read-only view of the world handed to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct TickContext {
    /// Tick being executed.
    pub tick: u64,
    /// Simulated time of the tick.
    pub at: DateTime<Utc>,
    /// Run seed.
    pub seed: u64,
    /// Every product, in key order, as of the start of handler execution.
    pub products: Vec<ProductState>,
    /// Organic visibility multiplier per product.
    pub visibility: BTreeMap<ProductId, f64>,
}

impl TickContext {
    /// Tick and timestamp as one value.
    pub const fn stamp(&self) -> TickStamp {
        TickStamp {
            tick: self.tick,
            at: self.at,
        }
    }

    /// Visibility of a product, neutral (1.0) if unknown.
    pub fn visibility_of(&self, product_id: &ProductId) -> f64 {
        self.visibility.get(product_id).copied().unwrap_or(1.0)
    }

    /// A random stream private to this tick and `stream`.
    ///
    /// Two handlers using different stream tags never share draws, and a
    /// stream's draws do not depend on how many draws earlier ticks made.
    pub fn rng(&self, stream: u64) -> StdRng {
        StdRng::seed_from_u64(derive_seed(self.seed, self.tick, stream))
    }
}

/// A participant invoked once per tick.
///
/// Implementations may be slow (for example, a pricing strategy calling
/// out to a model); the orchestrator discards their output for the tick if
/// they exceed the handler timeout.
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Stable name used in logs and the tick's completion record.
    fn name(&self) -> &str;

    /// Produce the commands this handler wants submitted for the tick.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the handler cannot act this tick. The
    /// failure is recorded and the tick continues without its commands.
    async fn on_tick(&self, context: &TickContext) -> Result<Vec<Command>, HandlerError>;
}
