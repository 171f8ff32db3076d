//! In-process journal backend.
//!
//! Stores encoded [`EventRecord`]s behind a single async mutex, so reads
//! exercise the same decode path as the `SQLite` backend. Records are kept
//! per run in journal order, so the latest tick is the last record and tick
//! ranges are found by binary search. A write-fault switch lets tests
//! simulate a storage outage mid-run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use flywheel_types::{Event, EventId, SimulationId};
use tokio::sync::Mutex;

use crate::error::JournalError;
use crate::query::HistoryQuery;
use crate::record::EventRecord;
use crate::{EventJournal, JournalMaintenance, batch_runs, validate_batch};

/// One run's records, in `(tick, sequence)` order by construction: ticks
/// never go backwards within a run and sequences only grow.
type RunLog = Vec<EventRecord>;

#[derive(Debug, Default)]
struct Inner {
    initialized: bool,
    runs: BTreeMap<SimulationId, RunLog>,
    ids: BTreeSet<EventId>,
    next_sequence: u64,
    len: usize,
}

impl Inner {
    fn latest_tick(&self, simulation_id: SimulationId) -> Option<u64> {
        self.runs
            .get(&simulation_id)
            .and_then(|log| log.last())
            .map(|r| r.tick)
    }
}

/// An [`EventJournal`] that lives in memory for the lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    inner: Mutex<Inner>,
    write_fault: AtomicBool,
}

impl MemoryJournal {
    /// Create an empty, uninitialized journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`JournalError::Unavailable`]
    /// until the fault is cleared.
    pub fn set_write_fault(&self, faulted: bool) {
        self.write_fault.store(faulted, Ordering::Release);
    }

    /// Number of stored events across all runs.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len
    }

    /// Whether no events are stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.len == 0
    }
}

/// The slice of `log` whose ticks fall inside the query's tick bounds.
fn tick_range<'a>(log: &'a [EventRecord], query: &HistoryQuery) -> &'a [EventRecord] {
    let lo = query
        .from_tick
        .map_or(0, |from| log.partition_point(|r| r.tick < from));
    let hi = query
        .until_tick
        .map_or(log.len(), |until| log.partition_point(|r| r.tick <= until));
    log.get(lo..hi).unwrap_or_default()
}

#[async_trait]
impl EventJournal for MemoryJournal {
    async fn initialize(&self) -> Result<(), JournalError> {
        self.inner.lock().await.initialized = true;
        Ok(())
    }

    async fn append_batch(&self, events: &[Event]) -> Result<(), JournalError> {
        let mut inner = self.inner.lock().await;
        if !inner.initialized {
            return Err(JournalError::Unavailable {
                reason: String::from("journal not initialized"),
            });
        }

        let stored: BTreeMap<SimulationId, u64> = batch_runs(events)
            .into_iter()
            .filter_map(|run| inner.latest_tick(run).map(|tick| (run, tick)))
            .collect();
        validate_batch(events, &stored)?;
        if let Some(existing) = events.iter().find(|e| inner.ids.contains(&e.event_id())) {
            return Err(JournalError::DuplicateEventId {
                event_id: existing.event_id(),
            });
        }

        if self.write_fault.load(Ordering::Acquire) {
            return Err(JournalError::Unavailable {
                reason: String::from("injected write fault"),
            });
        }

        // Encode everything first so a failure leaves the journal untouched.
        let mut encoded = Vec::with_capacity(events.len());
        let mut sequence = inner.next_sequence;
        for event in events {
            sequence = sequence.saturating_add(1);
            encoded.push(EventRecord::encode(sequence, event)?);
        }

        let Inner { runs, ids, len, .. } = &mut *inner;
        for record in encoded {
            ids.insert(record.event_id);
            runs.entry(record.simulation_id).or_default().push(record);
        }
        *len = len.saturating_add(events.len());
        inner.next_sequence = sequence;
        tracing::trace!(count = events.len(), "Appended events to memory journal");
        Ok(())
    }

    async fn get_history(
        &self,
        simulation_id: SimulationId,
        query: &HistoryQuery,
    ) -> Result<Vec<Event>, JournalError> {
        let inner = self.inner.lock().await;
        let Some(log) = inner.runs.get(&simulation_id) else {
            return Ok(Vec::new());
        };
        tick_range(log, query)
            .iter()
            .filter(|r| query.matches_parts(r.tick, &r.event_type))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(EventRecord::decode)
            .collect()
    }

    async fn get_latest_tick(
        &self,
        simulation_id: SimulationId,
    ) -> Result<Option<u64>, JournalError> {
        Ok(self.inner.lock().await.latest_tick(simulation_id))
    }

    async fn export(&self, simulation_id: SimulationId) -> Result<Vec<EventRecord>, JournalError> {
        let inner = self.inner.lock().await;
        Ok(inner.runs.get(&simulation_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl JournalMaintenance for MemoryJournal {
    async fn purge_run(&self, simulation_id: SimulationId) -> Result<u64, JournalError> {
        let mut inner = self.inner.lock().await;
        let Some(log) = inner.runs.remove(&simulation_id) else {
            return Ok(0);
        };
        for record in &log {
            inner.ids.remove(&record.event_id);
        }
        inner.len = inner.len.saturating_sub(log.len());
        Ok(u64::try_from(log.len()).unwrap_or(u64::MAX))
    }
}
