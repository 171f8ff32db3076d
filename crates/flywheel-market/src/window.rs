//! Rolling per-tick sales history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Units sold per tick, oldest first, bounded to a horizon in ticks.
///
/// Sales in the same tick are merged into one entry, so the window never
/// holds more than `horizon` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesWindow {
    entries: VecDeque<(u64, u64)>,
}

impl SalesWindow {
    /// An empty window.
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Add `units` sold at `tick` and drop entries older than `horizon`.
    pub fn record(&mut self, tick: u64, units: u64, horizon: u64) {
        match self.entries.back_mut() {
            Some((last_tick, total)) if *last_tick == tick => {
                *total = total.saturating_add(units);
            }
            _ => self.entries.push_back((tick, units)),
        }
        self.prune(tick, horizon);
    }

    /// Drop entries that fall outside `horizon` ticks ending at `now`.
    pub fn prune(&mut self, now: u64, horizon: u64) {
        while let Some(&(tick, _)) = self.entries.front() {
            if now.saturating_sub(tick) >= horizon {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Units sold in the `span` ticks ending at `now` (inclusive).
    pub fn units_within(&self, now: u64, span: u64) -> u64 {
        self.entries
            .iter()
            .filter(|(tick, _)| *tick <= now && now.saturating_sub(*tick) < span)
            .fold(0_u64, |sum, (_, units)| sum.saturating_add(*units))
    }

    /// Average units per tick over the `span` ticks ending at `now`.
    pub fn velocity(&self, now: u64, span: u64) -> f64 {
        if span == 0 {
            return 0.0;
        }
        as_f64(self.units_within(now, span)) / as_f64(span)
    }

    /// Number of distinct ticks held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sales are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counts stay far below 2^52, where the conversion is exact.
#[allow(clippy::cast_precision_loss)]
pub(crate) const fn as_f64(value: u64) -> f64 {
    value as f64
}
