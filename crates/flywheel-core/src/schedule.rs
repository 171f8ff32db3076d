//! Externally supplied command schedule.
//!
//! The schedule is part of a run's inputs: the same schedule, seed and
//! configuration always produce the same journal. Commands scheduled for
//! a tick are submitted at the start of that tick, before any handler
//! runs, in the order they were scheduled.

use std::collections::BTreeMap;

use flywheel_types::Command;
use serde::{Deserialize, Serialize};

/// One scheduled command, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    /// Tick at which to submit.
    pub tick: u64,
    /// The command.
    pub command: Command,
}

/// Commands keyed by the tick they are submitted at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSchedule {
    by_tick: BTreeMap<u64, Vec<Command>>,
}

impl CommandSchedule {
    /// An empty schedule.
    pub const fn new() -> Self {
        Self {
            by_tick: BTreeMap::new(),
        }
    }

    /// Build from configuration entries, keeping their relative order.
    pub fn from_entries(entries: impl IntoIterator<Item = ScheduledCommand>) -> Self {
        let mut schedule = Self::new();
        for entry in entries {
            schedule.push(entry.tick, entry.command);
        }
        schedule
    }

    /// Add a command after any already scheduled for `tick`.
    pub fn push(&mut self, tick: u64, command: Command) {
        self.by_tick.entry(tick).or_default().push(command);
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn with(mut self, tick: u64, command: Command) -> Self {
        self.push(tick, command);
        self
    }

    /// Commands due at `tick`, in schedule order.
    pub fn commands_at(&self, tick: u64) -> &[Command] {
        self.by_tick
            .get(&tick)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Last tick with scheduled commands.
    pub fn last_tick(&self) -> Option<u64> {
        self.by_tick.keys().next_back().copied()
    }

    /// Total number of scheduled commands.
    pub fn len(&self) -> usize {
        self.by_tick.values().map(Vec::len).sum()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.by_tick.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn commands_keep_schedule_order() {
        let schedule = CommandSchedule::from_entries([
            ScheduledCommand {
                tick: 2,
                command: Command::place_order("SKU-1", 1),
            },
            ScheduledCommand {
                tick: 1,
                command: Command::set_price("SKU-1", Decimal::TEN),
            },
            ScheduledCommand {
                tick: 2,
                command: Command::place_order("SKU-1", 2),
            },
        ]);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule.last_tick(), Some(2));
        let at_two = schedule.commands_at(2);
        assert_eq!(at_two.len(), 2);
        assert_eq!(at_two[0], Command::place_order("SKU-1", 1));
        assert_eq!(at_two[1], Command::place_order("SKU-1", 2));
        assert!(schedule.commands_at(7).is_empty());
    }

    #[test]
    fn empty_schedule() {
        let schedule = CommandSchedule::new();
        assert!(schedule.is_empty());
        assert_eq!(schedule.last_tick(), None);
    }
}
