//! Best-seller rank and visibility math.
//!
//! All functions are pure. Ranks are integers in `[min_bsr, max_bsr]`;
//! intermediate values are computed in `f64` and brought back through
//! [`to_rank`], the only float-to-integer conversion in the crate.

use crate::config::RankingConfig;
use crate::window::as_f64;

/// Rank a product selling `velocity` units per tick would settle at.
pub fn target_rank(velocity: f64, config: &RankingConfig) -> f64 {
    if velocity <= 0.0 {
        return as_f64(config.max_bsr);
    }
    config.target_constant / velocity.powf(config.target_exponent)
}

/// Move `current` part of the way toward the velocity target.
///
/// With zero velocity this decays one tick instead.
pub fn smooth_toward_target(current: u64, velocity: f64, config: &RankingConfig) -> u64 {
    if velocity <= 0.0 {
        return decay(current, 1, config);
    }
    let w = config.smoothing_weight;
    let blended = (1.0 - w).mul_add(as_f64(current), w * target_rank(velocity, config));
    to_rank(blended.round(), config)
}

/// Worsen `current` for `elapsed` ticks without sales.
///
/// The exponent is capped so long idle stretches cannot run away; the
/// result is rounded up so any positive rate strictly worsens the rank
/// until it reaches `max_bsr`.
pub fn decay(current: u64, elapsed: u64, config: &RankingConfig) -> u64 {
    if elapsed == 0 {
        return to_rank(as_f64(current), config);
    }
    let exponent = i32::try_from(elapsed.min(u64::from(config.decay_exponent_cap)))
        .unwrap_or(i32::MAX);
    let factor = (1.0 + config.decay_rate).powi(exponent);
    to_rank((as_f64(current) * factor).ceil(), config)
}

/// Organic visibility multiplier for a rank.
pub fn visibility(bsr: u64, config: &RankingConfig) -> f64 {
    config
        .visibility_bands
        .iter()
        .find(|band| bsr <= band.max_bsr)
        .map_or(config.fallback_visibility, |band| band.multiplier)
}

/// Clamp a float rank into `[min_bsr, max_bsr]` and convert it.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_rank(value: f64, config: &RankingConfig) -> u64 {
    let min = as_f64(config.min_bsr);
    let max = as_f64(config.max_bsr);
    if value.is_nan() {
        return config.max_bsr;
    }
    // Clamped to a non-negative range below 2^53, so the cast is exact.
    let clamped = value.clamp(min, max) as u64;
    clamped.clamp(config.min_bsr, config.max_bsr)
}
