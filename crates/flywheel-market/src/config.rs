//! Ranking and review constants.
//!
//! Every constant of the flywheel is configuration. The defaults describe
//! the reference behavior; none of them is an external contract.

use serde::{Deserialize, Serialize};

/// One visibility band: ranks up to and including `max_bsr` get `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibilityBand {
    /// Worst rank still inside the band.
    pub max_bsr: u64,
    /// Organic visibility multiplier for the band.
    pub multiplier: f64,
}

/// Configuration for the market ranking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Chance that one sold unit produces a review.
    #[serde(default = "default_review_probability")]
    pub review_probability: f64,
    /// Mean of the review rating distribution.
    #[serde(default = "default_rating_mean")]
    pub rating_mean: f64,
    /// Standard deviation of the review rating distribution.
    #[serde(default = "default_rating_std_dev")]
    pub rating_std_dev: f64,
    /// Best possible rank.
    #[serde(default = "default_min_bsr")]
    pub min_bsr: u64,
    /// Worst possible rank.
    #[serde(default = "default_max_bsr")]
    pub max_bsr: u64,
    /// Rank of a product before its first sale.
    #[serde(default = "default_initial_bsr")]
    pub initial_bsr: u64,
    /// Fractional rank worsening per tick without sales.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Largest elapsed-tick exponent applied in one decay step.
    #[serde(default = "default_decay_exponent_cap")]
    pub decay_exponent_cap: u32,
    /// Weight of the velocity target when smoothing: `(1 - w) * current + w * target`.
    #[serde(default = "default_smoothing_weight")]
    pub smoothing_weight: f64,
    /// Numerator of the target rank: `target_constant / velocity ^ target_exponent`.
    #[serde(default = "default_target_constant")]
    pub target_constant: f64,
    /// Exponent applied to short-window velocity for the target rank.
    #[serde(default = "default_target_exponent")]
    pub target_exponent: f64,
    /// Short velocity window in ticks.
    #[serde(default = "default_short_window")]
    pub short_window_ticks: u64,
    /// Long velocity window in ticks; sales older than this are dropped.
    #[serde(default = "default_long_window")]
    pub long_window_ticks: u64,
    /// Bands in ascending `max_bsr` order.
    #[serde(default = "default_visibility_bands")]
    pub visibility_bands: Vec<VisibilityBand>,
    /// Multiplier for ranks worse than every band.
    #[serde(default = "default_fallback_visibility")]
    pub fallback_visibility: f64,
    /// Most recent reviews kept per product. Counts and averages cover all.
    #[serde(default = "default_max_retained_reviews")]
    pub max_retained_reviews: usize,
}

const fn default_review_probability() -> f64 {
    0.1
}

const fn default_rating_mean() -> f64 {
    4.2
}

const fn default_rating_std_dev() -> f64 {
    0.8
}

const fn default_min_bsr() -> u64 {
    1
}

const fn default_max_bsr() -> u64 {
    1_000_000
}

const fn default_initial_bsr() -> u64 {
    1_000_000
}

const fn default_decay_rate() -> f64 {
    0.05
}

const fn default_decay_exponent_cap() -> u32 {
    30
}

const fn default_smoothing_weight() -> f64 {
    0.3
}

const fn default_target_constant() -> f64 {
    100_000.0
}

const fn default_target_exponent() -> f64 {
    1.0
}

const fn default_short_window() -> u64 {
    7
}

const fn default_long_window() -> u64 {
    30
}

fn default_visibility_bands() -> Vec<VisibilityBand> {
    [
        (100, 2.0),
        (1_000, 1.5),
        (10_000, 1.2),
        (50_000, 1.0),
        (100_000, 0.8),
    ]
    .into_iter()
    .map(|(max_bsr, multiplier)| VisibilityBand {
        max_bsr,
        multiplier,
    })
    .collect()
}

const fn default_fallback_visibility() -> f64 {
    0.5
}

const fn default_max_retained_reviews() -> usize {
    500
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            review_probability: default_review_probability(),
            rating_mean: default_rating_mean(),
            rating_std_dev: default_rating_std_dev(),
            min_bsr: default_min_bsr(),
            max_bsr: default_max_bsr(),
            initial_bsr: default_initial_bsr(),
            decay_rate: default_decay_rate(),
            decay_exponent_cap: default_decay_exponent_cap(),
            smoothing_weight: default_smoothing_weight(),
            target_constant: default_target_constant(),
            target_exponent: default_target_exponent(),
            short_window_ticks: default_short_window(),
            long_window_ticks: default_long_window(),
            visibility_bands: default_visibility_bands(),
            fallback_visibility: default_fallback_visibility(),
            max_retained_reviews: default_max_retained_reviews(),
        }
    }
}

impl RankingConfig {
    /// Describe the first nonsensical value, if any.
    pub fn problems(&self) -> Option<String> {
        if !(0.0..=1.0).contains(&self.review_probability) {
            return Some(format!(
                "review_probability {} outside [0, 1]",
                self.review_probability
            ));
        }
        if !self.rating_mean.is_finite()
            || !self.rating_std_dev.is_finite()
            || self.rating_std_dev < 0.0
        {
            return Some(String::from(
                "rating distribution needs a finite mean and non-negative std dev",
            ));
        }
        if self.min_bsr == 0 || self.min_bsr > self.max_bsr {
            return Some(format!(
                "bsr bounds [{}, {}] are invalid",
                self.min_bsr, self.max_bsr
            ));
        }
        if !(self.min_bsr..=self.max_bsr).contains(&self.initial_bsr) {
            return Some(format!(
                "initial_bsr {} outside [{}, {}]",
                self.initial_bsr, self.min_bsr, self.max_bsr
            ));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Some(format!("decay_rate {} must be >= 0", self.decay_rate));
        }
        if !(0.0..=1.0).contains(&self.smoothing_weight) {
            return Some(format!(
                "smoothing_weight {} outside [0, 1]",
                self.smoothing_weight
            ));
        }
        if !self.target_constant.is_finite()
            || self.target_constant <= 0.0
            || !self.target_exponent.is_finite()
        {
            return Some(String::from(
                "target_constant must be positive and target_exponent finite",
            ));
        }
        if self.short_window_ticks == 0 || self.long_window_ticks < self.short_window_ticks {
            return Some(format!(
                "windows {}/{} must satisfy 0 < short <= long",
                self.short_window_ticks, self.long_window_ticks
            ));
        }
        if self
            .visibility_bands
            .windows(2)
            .any(|pair| matches!(pair, [a, b] if a.max_bsr >= b.max_bsr))
        {
            return Some(String::from(
                "visibility_bands must be sorted by strictly ascending max_bsr",
            ));
        }
        if self
            .visibility_bands
            .iter()
            .map(|band| band.multiplier)
            .chain(core::iter::once(self.fallback_visibility))
            .any(|m| !m.is_finite() || m < 0.0)
        {
            return Some(String::from("visibility multipliers must be finite and >= 0"));
        }
        None
    }
}
