//! The market ranking engine.
//!
//! [`MarketRankingEngine::observe`] is a deterministic fold over journaled
//! events: sales update velocity and rank, posted reviews update ratings,
//! and each `TickCompleted` marker runs idle decay for products that did
//! not sell that tick. Random review draws happen separately in
//! [`MarketRankingEngine::draft_reviews`], whose output is journaled and
//! then observed like any other event, so replay never re-samples.

use std::collections::BTreeMap;

use flywheel_types::{Event, EventFactory, EventKind, ProductId, Review, ReviewId, TickStamp};

use crate::bsr;
use crate::config::RankingConfig;
use crate::reviews::ReviewSampler;
use crate::state::ProductRankingState;

/// Owner of every [`ProductRankingState`].
#[derive(Debug, Clone)]
pub struct MarketRankingEngine {
    config: RankingConfig,
    products: BTreeMap<ProductId, ProductRankingState>,
}

impl MarketRankingEngine {
    /// An engine with no ranked products.
    pub const fn new(config: RankingConfig) -> Self {
        Self {
            config,
            products: BTreeMap::new(),
        }
    }

    /// Constants in force.
    pub const fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Fold one journaled event into ranking state.
    pub fn observe(&mut self, event: &Event) {
        let tick = event.tick();
        match event.kind() {
            EventKind::SaleRecorded {
                product_id,
                units_sold,
                ..
            } => {
                let state = ranking_entry(&mut self.products, product_id, tick, &self.config);
                state.record_sale(tick, *units_sold, &self.config);
                tracing::debug!(
                    tick,
                    product = %product_id,
                    bsr = state.bsr,
                    velocity_7d = state.velocity_7d,
                    "Re-ranked after sale"
                );
            }
            EventKind::ReviewPosted { review } => {
                let state =
                    ranking_entry(&mut self.products, review.product_id(), tick, &self.config);
                state.record_review(review.clone(), &self.config);
            }
            EventKind::TickCompleted { .. } => self.end_of_tick(tick),
            EventKind::SimulationStarted { .. }
            | EventKind::TickStarted { .. }
            | EventKind::ProductRegistered { .. }
            | EventKind::PriceChanged { .. }
            | EventKind::InventoryRestocked { .. }
            | EventKind::CampaignLaunched { .. }
            | EventKind::CustomerMessageAnswered { .. }
            | EventKind::SimulationEnded { .. } => {}
        }
    }

    /// Fold events in order.
    pub fn observe_all<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) {
        for event in events {
            self.observe(event);
        }
    }

    /// Draw reviews for the sales among `events`.
    ///
    /// Each sold unit independently becomes a review with the configured
    /// probability. Review IDs come from `factory` and timestamps from
    /// `stamp`, so the drafts are deterministic for a given seed and history.
    pub fn draft_reviews(
        &self,
        events: &[Event],
        seed: u64,
        factory: &EventFactory,
        stamp: TickStamp,
    ) -> Vec<EventKind> {
        let mut sampler = ReviewSampler::for_tick(seed, stamp.tick, &self.config);
        let mut drafts = Vec::new();

        for event in events {
            let EventKind::SaleRecorded {
                product_id,
                units_sold,
                ..
            } = event.kind()
            else {
                continue;
            };
            for _ in 0..*units_sold {
                if !sampler.draws_review() {
                    continue;
                }
                let rating = sampler.rating();
                match Review::new(
                    ReviewId(factory.next_uuid()),
                    product_id.clone(),
                    rating,
                    stamp.at,
                    true,
                ) {
                    Ok(review) => drafts.push(EventKind::ReviewPosted { review }),
                    Err(e) => tracing::warn!(product = %product_id, "Dropped review draft: {e}"),
                }
            }
        }
        drafts
    }

    /// Ranking state of one product.
    pub fn product(&self, product_id: &ProductId) -> Option<&ProductRankingState> {
        self.products.get(product_id)
    }

    /// Visibility multiplier demand should use for a product.
    ///
    /// Products that have never sold sit at the initial rank's band.
    pub fn visibility(&self, product_id: &ProductId) -> f64 {
        self.products.get(product_id).map_or_else(
            || bsr::visibility(self.config.initial_bsr, &self.config),
            |state| state.visibility,
        )
    }

    /// Visibility for each of `product_ids`.
    pub fn visibility_map<'a>(
        &self,
        product_ids: impl IntoIterator<Item = &'a ProductId>,
    ) -> BTreeMap<ProductId, f64> {
        product_ids
            .into_iter()
            .map(|id| (id.clone(), self.visibility(id)))
            .collect()
    }

    /// Copy of every ranking record, in product order.
    pub fn snapshot(&self) -> BTreeMap<ProductId, ProductRankingState> {
        self.products.clone()
    }

    /// Number of ranked products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether no product has been ranked yet.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn end_of_tick(&mut self, tick: u64) {
        let mut decayed = 0_usize;
        for state in self.products.values_mut() {
            if state.last_sale_tick == Some(tick) {
                continue;
            }
            let before = state.bsr;
            state.decay_idle(tick, &self.config);
            if state.bsr != before {
                decayed = decayed.saturating_add(1);
            }
        }
        if decayed > 0 {
            tracing::trace!(tick, decayed, "Idle products decayed");
        }
    }
}

/// The ranking record for a product, created lazily on first reference.
fn ranking_entry<'a>(
    products: &'a mut BTreeMap<ProductId, ProductRankingState>,
    product_id: &ProductId,
    tick: u64,
    config: &RankingConfig,
) -> &'a mut ProductRankingState {
    products
        .entry(product_id.clone())
        .or_insert_with(|| ProductRankingState::new(product_id.clone(), tick, config))
}
