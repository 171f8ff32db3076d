//! Customer reviews produced by the ranking engine.
//!
//! A [`Review`] is constructed once and never mutated. Fields are private
//! and exposed through accessors; the only constructor validates the
//! rating range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ProductId, ReviewId};

/// Lowest rating a review may carry.
pub const MIN_RATING: f64 = 1.0;

/// Highest rating a review may carry.
pub const MAX_RATING: f64 = 5.0;

/// Errors raised when constructing a [`Review`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewError {
    /// The rating is outside `[1.0, 5.0]` or not a finite number.
    #[error("rating {rating} outside [1.0, 5.0]")]
    RatingOutOfRange {
        /// The offending rating.
        rating: f64,
    },
}

/// Sentiment bucket derived from a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    /// Rating of 4.0 or higher.
    Positive,
    /// Rating in `[3.0, 4.0)`.
    Neutral,
    /// Rating below 3.0.
    Negative,
}

impl Sentiment {
    /// Bucket a rating.
    pub fn from_rating(rating: f64) -> Self {
        if rating >= 4.0 {
            Self::Positive
        } else if rating >= 3.0 {
            Self::Neutral
        } else {
            Self::Negative
        }
    }
}

/// An immutable customer review of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    id: ReviewId,
    product_id: ProductId,
    rating: f64,
    timestamp: DateTime<Utc>,
    verified: bool,
}

impl Review {
    /// Construct a review, validating the rating.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::RatingOutOfRange`] if `rating` is not finite
    /// or lies outside `[1.0, 5.0]`.
    pub fn new(
        id: ReviewId,
        product_id: ProductId,
        rating: f64,
        timestamp: DateTime<Utc>,
        verified: bool,
    ) -> Result<Self, ReviewError> {
        if !is_valid_rating(rating) {
            return Err(ReviewError::RatingOutOfRange { rating });
        }
        Ok(Self {
            id,
            product_id,
            rating,
            timestamp,
            verified,
        })
    }

    /// Review identifier.
    pub const fn id(&self) -> ReviewId {
        self.id
    }

    /// Product the review is about.
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Star rating in `[1.0, 5.0]`, in half-point steps when sampled.
    pub const fn rating(&self) -> f64 {
        self.rating
    }

    /// Simulated time the review was posted.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the review comes from a verified purchase.
    pub const fn verified(&self) -> bool {
        self.verified
    }

    /// Sentiment bucket derived from the rating.
    pub fn sentiment(&self) -> Sentiment {
        Sentiment::from_rating(self.rating)
    }

    /// Whether the stored rating is still in range.
    ///
    /// Always true for reviews built through [`Review::new`]; decoded
    /// reviews are checked with this before they are accepted.
    pub fn is_valid(&self) -> bool {
        is_valid_rating(self.rating) && !self.product_id.is_empty()
    }
}

fn is_valid_rating(rating: f64) -> bool {
    rating.is_finite() && (MIN_RATING..=MAX_RATING).contains(&rating)
}
