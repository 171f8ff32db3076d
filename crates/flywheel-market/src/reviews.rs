//! Review sampling.
//!
//! Randomness in the flywheel lives here and nowhere else. Every draw comes
//! from a [`StdRng`] seeded from `(run seed, tick, stream)`, so a tick's
//! reviews depend only on the seed and that tick's sales, never on how many
//! draws earlier ticks made.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use flywheel_types::review::{MAX_RATING, MIN_RATING};

use crate::config::RankingConfig;

/// Stream tag for review draws.
pub const REVIEW_STREAM: u64 = 0x5245_5649_4557;

/// Derive an independent seed for one `(tick, stream)` of a run.
///
/// `SplitMix64` finalizer over the combined inputs.
pub const fn derive_seed(seed: u64, tick: u64, stream: u64) -> u64 {
    let mut z = seed
        ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ stream.wrapping_mul(0xD1B5_4A32_D192_ED03);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draws whether a unit gets reviewed and what it is rated.
#[derive(Debug)]
pub struct ReviewSampler {
    rng: StdRng,
    probability: f64,
    rating: Option<Normal<f64>>,
    fallback_rating: f64,
}

impl ReviewSampler {
    /// A sampler for one tick of a run.
    pub fn for_tick(seed: u64, tick: u64, config: &RankingConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(derive_seed(seed, tick, REVIEW_STREAM)),
            probability: config.review_probability.clamp(0.0, 1.0),
            rating: Normal::new(config.rating_mean, config.rating_std_dev).ok(),
            fallback_rating: config.rating_mean,
        }
    }

    /// Whether the next sold unit produces a review.
    pub fn draws_review(&mut self) -> bool {
        self.rng.random_bool(self.probability)
    }

    /// A rating clamped to `[1.0, 5.0]` and rounded to the nearest half point.
    pub fn rating(&mut self) -> f64 {
        let raw = self
            .rating
            .as_ref()
            .map_or(self.fallback_rating, |normal| normal.sample(&mut self.rng));
        round_half(raw)
    }
}

/// Clamp into the rating range, then round to the nearest 0.5.
pub fn round_half(raw: f64) -> f64 {
    let bounded = if raw.is_finite() {
        raw.clamp(MIN_RATING, MAX_RATING)
    } else {
        MAX_RATING
    };
    (bounded * 2.0).round() / 2.0
}
