//! The sales flywheel: velocity, reviews, best-seller rank and visibility.
//!
//! Sales feed a rolling window per product. Velocity over that window
//! drives a best-seller rank (lower is better) that is smoothed toward a
//! velocity-derived target, decays while a product sits idle, and maps to
//! an organic-visibility multiplier the demand model reads on the next
//! tick.
//!
//! # Modules
//!
//! - [`config`] -- [`RankingConfig`] and [`VisibilityBand`].
//! - [`window`] -- [`SalesWindow`], per-tick sales history.
//! - [`bsr`] -- pure rank, decay and visibility math.
//! - [`reviews`] -- seeded [`ReviewSampler`].
//! - [`state`] -- [`ProductRankingState`].
//! - [`engine`] -- [`MarketRankingEngine`], the event fold.

pub mod bsr;
pub mod config;
pub mod engine;
pub mod reviews;
pub mod state;
pub mod window;

pub use config::{RankingConfig, VisibilityBand};
pub use engine::MarketRankingEngine;
pub use reviews::{ReviewSampler, derive_seed};
pub use state::ProductRankingState;
pub use window::SalesWindow;
