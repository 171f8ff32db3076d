//! Fulfillment: reorders stock for products running low.

use async_trait::async_trait;
use flywheel_types::{AgentId, Command, CommandKind};
use rust_decimal::Decimal;

use crate::config::FulfillmentConfig;
use crate::handler::{HandlerError, TickContext, TickHandler};

/// Agent recorded on restock commands.
pub const FULFILLMENT_AGENT: &str = "fulfillment";

/// Built-in restocking handler.
///
/// A product whose on-hand inventory is below the reorder point gets one
/// restock of `reorder_quantity` units at its current unit cost.
#[derive(Debug, Clone)]
pub struct RestockHandler {
    config: FulfillmentConfig,
    agent: AgentId,
}

impl RestockHandler {
    /// Create a handler with the given policy.
    pub fn new(config: FulfillmentConfig) -> Self {
        Self {
            config,
            agent: AgentId::from(FULFILLMENT_AGENT),
        }
    }
}

#[async_trait]
impl TickHandler for RestockHandler {
    fn name(&self) -> &str {
        "fulfillment"
    }

    async fn on_tick(&self, context: &TickContext) -> Result<Vec<Command>, HandlerError> {
        if self.config.reorder_quantity == 0 {
            return Ok(Vec::new());
        }
        Ok(context
            .products
            .iter()
            .filter(|product| product.inventory < self.config.reorder_point)
            .map(|product| Command {
                agent_id: Some(self.agent.clone()),
                kind: CommandKind::RestockInventory {
                    product_id: product.product_id.clone(),
                    units: self.config.reorder_quantity,
                    unit_cost: product.cost.max(Decimal::ZERO),
                },
            })
            .collect())
    }
}
