//! Per-product ranking record.

use flywheel_types::{ProductId, Review};
use serde::{Deserialize, Serialize};

use crate::bsr;
use crate::config::RankingConfig;
use crate::window::{SalesWindow, as_f64};

/// Ranking state of one product, owned by the ranking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRankingState {
    /// Product key.
    pub product_id: ProductId,
    /// Lifetime units sold.
    pub total_sales: u64,
    /// Units per tick over the short window.
    pub velocity_7d: f64,
    /// Units per tick over the long window.
    pub velocity_30d: f64,
    /// Most recent reviews, oldest first.
    pub reviews: Vec<Review>,
    /// Lifetime review count.
    pub review_count: u64,
    /// Sum of every rating, for the running average.
    pub rating_sum: f64,
    /// Average rating over every review (0 before the first).
    pub average_rating: f64,
    /// Current best-seller rank.
    pub bsr: u64,
    /// Organic visibility multiplier for the current rank.
    pub visibility: f64,
    /// Tick the rank was last recomputed.
    pub last_updated_tick: u64,
    /// Tick of the most recent sale.
    pub last_sale_tick: Option<u64>,
    /// Rolling sales history.
    pub window: SalesWindow,
}

impl ProductRankingState {
    /// Fresh state for a product with no sales yet.
    pub fn new(product_id: ProductId, tick: u64, config: &RankingConfig) -> Self {
        let bsr = config.initial_bsr.clamp(config.min_bsr, config.max_bsr);
        Self {
            product_id,
            total_sales: 0,
            velocity_7d: 0.0,
            velocity_30d: 0.0,
            reviews: Vec::new(),
            review_count: 0,
            rating_sum: 0.0,
            average_rating: 0.0,
            bsr,
            visibility: bsr::visibility(bsr, config),
            last_updated_tick: tick,
            last_sale_tick: None,
            window: SalesWindow::new(),
        }
    }

    /// Record a sale and re-rank.
    pub fn record_sale(&mut self, tick: u64, units: u32, config: &RankingConfig) {
        let units = u64::from(units);
        self.window.record(tick, units, config.long_window_ticks);
        self.total_sales = self.total_sales.saturating_add(units);
        self.last_sale_tick = Some(tick);
        self.refresh_velocity(tick, config);
        self.bsr = bsr::smooth_toward_target(self.bsr, self.velocity_7d, config);
        self.visibility = bsr::visibility(self.bsr, config);
        self.last_updated_tick = tick;
    }

    /// Record a posted review.
    pub fn record_review(&mut self, review: Review, config: &RankingConfig) {
        self.review_count = self.review_count.saturating_add(1);
        self.rating_sum += review.rating();
        self.average_rating = self.rating_sum / as_f64(self.review_count);
        self.reviews.push(review);
        if self.reviews.len() > config.max_retained_reviews {
            let excess = self.reviews.len().saturating_sub(config.max_retained_reviews);
            self.reviews.drain(..excess);
        }
    }

    /// End-of-tick maintenance for a product that did not sell at `tick`.
    pub fn decay_idle(&mut self, tick: u64, config: &RankingConfig) {
        let elapsed = tick.saturating_sub(self.last_updated_tick);
        if elapsed == 0 {
            return;
        }
        self.window.prune(tick, config.long_window_ticks);
        self.refresh_velocity(tick, config);
        self.bsr = bsr::decay(self.bsr, elapsed, config);
        self.visibility = bsr::visibility(self.bsr, config);
        self.last_updated_tick = tick;
    }

    fn refresh_velocity(&mut self, tick: u64, config: &RankingConfig) {
        self.velocity_7d = self.window.velocity(tick, config.short_window_ticks);
        self.velocity_30d = self.window.velocity(tick, config.long_window_ticks);
    }
}
