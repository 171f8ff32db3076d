//! Append-only event journal for the Flywheel market simulation.
//!
//! The journal is the sole source of truth for a run: the world state and
//! the ranking engine are both pure folds over what it returns. Writes are
//! all-or-nothing per batch, ticks never go backwards within a run, and
//! reads come back in `(tick, insertion sequence)` order.
//!
//! # Modules
//!
//! - [`error`] -- [`JournalError`] and the input/storage split.
//! - [`query`] -- [`HistoryQuery`] filters for history reads.
//! - [`record`] -- [`EventRecord`], the persisted/exported event shape.
//! - [`memory`] -- [`MemoryJournal`], an in-process backend for tests and
//!   ephemeral runs.
//! - [`sqlite`] -- [`SqliteJournal`], the durable `SQLite` backend.

pub mod error;
pub mod memory;
pub mod query;
pub mod record;
pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use flywheel_types::{Event, EventId, SimulationId};

pub use error::JournalError;
pub use memory::MemoryJournal;
pub use query::HistoryQuery;
pub use record::{EventRecord, export_json_lines};
pub use sqlite::SqliteJournal;

/// Durable, ordered, append-only event storage.
///
/// Implementations must make each [`append_batch`](Self::append_batch)
/// atomic: either every event in the slice is stored, or none is and the
/// journal is unchanged.
#[async_trait]
pub trait EventJournal: Send + Sync {
    /// Prepare storage. Safe to call more than once.
    async fn initialize(&self) -> Result<(), JournalError>;

    /// Append a single event.
    async fn append(&self, event: &Event) -> Result<(), JournalError> {
        self.append_batch(core::slice::from_ref(event)).await
    }

    /// Append events atomically, preserving slice order.
    ///
    /// # Errors
    ///
    /// Input errors ([`JournalError::is_input_error`]) are raised before
    /// anything is written. Any other error means the journal could not
    /// commit and the run must stop.
    async fn append_batch(&self, events: &[Event]) -> Result<(), JournalError>;

    /// Read a run's events in `(tick, sequence)` order.
    async fn get_history(
        &self,
        simulation_id: SimulationId,
        query: &HistoryQuery,
    ) -> Result<Vec<Event>, JournalError>;

    /// Highest tick recorded for a run, or `None` if the run has no events.
    async fn get_latest_tick(&self, simulation_id: SimulationId)
    -> Result<Option<u64>, JournalError>;

    /// Every stored record of a run in journal order.
    async fn export(&self, simulation_id: SimulationId) -> Result<Vec<EventRecord>, JournalError>;
}

/// Destructive maintenance operations, kept apart from the write path.
#[async_trait]
pub trait JournalMaintenance: Send + Sync {
    /// Delete every event of a run. Returns the number of removed events.
    async fn purge_run(&self, simulation_id: SimulationId) -> Result<u64, JournalError>;
}

/// Runs touched by a batch, for looking up their stored latest ticks.
pub fn batch_runs(events: &[Event]) -> BTreeSet<SimulationId> {
    events.iter().map(Event::simulation_id).collect()
}

/// Check a batch before it touches storage.
///
/// `stored` maps each run to the highest tick already recorded for it.
/// Every event must be well-formed, no ID may repeat inside the batch, and
/// ticks must not go below what is stored or below earlier events of the
/// same run in the batch.
///
/// # Errors
///
/// Returns the first input error found.
pub fn validate_batch(
    events: &[Event],
    stored: &BTreeMap<SimulationId, u64>,
) -> Result<(), JournalError> {
    let mut seen: BTreeSet<EventId> = BTreeSet::new();
    let mut floor = stored.clone();

    for event in events {
        event
            .kind()
            .validate()
            .map_err(|source| JournalError::Validation {
                event_id: event.event_id(),
                source,
            })?;

        if !seen.insert(event.event_id()) {
            return Err(JournalError::DuplicateEventId {
                event_id: event.event_id(),
            });
        }

        let simulation_id = event.simulation_id();
        if let Some(&latest) = floor.get(&simulation_id)
            && event.tick() < latest
        {
            return Err(JournalError::NonMonotonicTick {
                simulation_id,
                tick: event.tick(),
                latest,
            });
        }
        floor.insert(simulation_id, event.tick());
    }
    Ok(())
}
