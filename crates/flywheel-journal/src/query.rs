//! History query filters.

use flywheel_types::Event;

/// Filters for [`EventJournal::get_history`].
///
/// An empty query returns the whole run. Results are always ordered by
/// `(tick ascending, insertion order ascending)` and `limit` keeps the
/// first records in that order.
///
/// [`EventJournal::get_history`]: crate::EventJournal::get_history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Lowest tick to include.
    pub from_tick: Option<u64>,
    /// Highest tick to include.
    pub until_tick: Option<u64>,
    /// Discriminators to include (empty = all).
    pub event_types: Vec<String>,
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// A query matching the whole run.
    pub const fn new() -> Self {
        Self {
            from_tick: None,
            until_tick: None,
            event_types: Vec::new(),
            limit: None,
        }
    }

    /// Only events at or after `tick`.
    #[must_use]
    pub const fn from_tick(mut self, tick: u64) -> Self {
        self.from_tick = Some(tick);
        self
    }

    /// Only events at or before `tick`.
    #[must_use]
    pub const fn until_tick(mut self, tick: u64) -> Self {
        self.until_tick = Some(tick);
        self
    }

    /// Only events in exactly one tick.
    #[must_use]
    pub const fn at_tick(self, tick: u64) -> Self {
        self.from_tick(tick).until_tick(tick)
    }

    /// Only events with one of these discriminators.
    #[must_use]
    pub fn event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// At most `limit` events.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a tick and discriminator pass the filters (ignores `limit`).
    pub fn matches_parts(&self, tick: u64, event_type: &str) -> bool {
        if self.from_tick.is_some_and(|from| tick < from) {
            return false;
        }
        if self.until_tick.is_some_and(|until| tick > until) {
            return false;
        }
        self.event_types.is_empty() || self.event_types.iter().any(|t| t == event_type)
    }

    /// Whether an event passes the filters (ignores `limit`).
    pub fn matches(&self, event: &Event) -> bool {
        self.matches_parts(event.tick(), event.event_type())
    }
}
