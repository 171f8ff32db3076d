//! The single-writer world store.
//!
//! Every state change goes through one async mutex: arbitrate against the
//! current world, stamp the resulting events, append them to the journal,
//! and only after the journal commits fold them into the world. Two
//! submitters can never both pass validation before either applies, and a
//! journal failure leaves the world exactly as it was.
//!
//! A tick is committed as a unit. Between [`WorldStore::open_batch`] and
//! [`WorldStore::commit_batch`] events are applied to a working world and
//! held back from the journal; the commit appends them with one
//! `append_batch`. If that append fails the working world is thrown away
//! and the store is back at the last committed state.

use std::sync::Arc;

use flywheel_journal::{EventJournal, JournalError};
use flywheel_types::{
    AgentId, Command, CommandOutcome, Event, EventFactory, EventKind, ProductId, ProductState,
    TickStamp,
};
use tokio::sync::Mutex;

use crate::arbitration::arbitrate;
use crate::config::ArbitrationConfig;
use crate::world::{ReduceError, World};

/// Fatal world-store failures. Rejected commands are not errors.
#[derive(Debug, thiserror::Error)]
pub enum WorldStoreError {
    /// The journal could not commit; the run must stop.
    #[error("journal write failed: {0}")]
    Journal(#[from] JournalError),

    /// A journaled event could not be applied to the world.
    #[error("world state diverged from journal: {0}")]
    Reduce(#[from] ReduceError),
}

/// Per-tick command tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickTally {
    /// Commands accepted since the tick began.
    pub accepted: u64,
    /// Commands rejected since the tick began.
    pub rejected: u64,
}

/// Events applied to the working world but not yet journaled.
#[derive(Debug)]
struct OpenBatch {
    checkpoint: World,
    events: Vec<Event>,
}

#[derive(Debug)]
struct Inner {
    world: World,
    stamp: TickStamp,
    tally: TickTally,
    batch: Option<OpenBatch>,
}

/// Sole owner of mutable world state.
pub struct WorldStore {
    inner: Mutex<Inner>,
    journal: Arc<dyn EventJournal>,
    factory: Arc<EventFactory>,
    config: ArbitrationConfig,
}

impl core::fmt::Debug for WorldStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorldStore")
            .field("simulation_id", &self.factory.simulation_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorldStore {
    /// Create a store with an empty world, stamping events at `stamp`
    /// until the first [`begin_tick`](Self::begin_tick).
    pub fn new(
        journal: Arc<dyn EventJournal>,
        factory: Arc<EventFactory>,
        config: ArbitrationConfig,
        stamp: TickStamp,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                world: World::new(),
                stamp,
                tally: TickTally::default(),
                batch: None,
            }),
            journal,
            factory,
            config,
        }
    }

    /// Arbitration limits in force.
    pub const fn config(&self) -> &ArbitrationConfig {
        &self.config
    }

    /// Move to a new tick and reset the tallies. Returns the previous
    /// tick's tallies.
    pub async fn begin_tick(&self, stamp: TickStamp) -> TickTally {
        let mut inner = self.inner.lock().await;
        inner.stamp = stamp;
        core::mem::take(&mut inner.tally)
    }

    /// Start holding writes back from the journal until
    /// [`commit_batch`](Self::commit_batch). An already open batch is kept.
    pub async fn open_batch(&self) {
        let mut inner = self.inner.lock().await;
        if inner.batch.is_none() {
            let checkpoint = inner.world.clone();
            inner.batch = Some(OpenBatch {
                checkpoint,
                events: Vec::new(),
            });
        }
    }

    /// Events written since the batch was opened, in order.
    pub async fn staged(&self) -> Vec<Event> {
        self.inner
            .lock()
            .await
            .batch
            .as_ref()
            .map(|batch| batch.events.clone())
            .unwrap_or_default()
    }

    /// Append every staged event with one journal batch and close it.
    /// Returns the committed events; empty if no batch was open.
    ///
    /// # Errors
    ///
    /// Returns [`WorldStoreError::Journal`] if the append fails. The world
    /// is then rolled back to where it stood when the batch was opened.
    pub async fn commit_batch(&self) -> Result<Vec<Event>, WorldStoreError> {
        let mut inner = self.inner.lock().await;
        let Some(batch) = inner.batch.take() else {
            return Ok(Vec::new());
        };
        if batch.events.is_empty() {
            return Ok(Vec::new());
        }
        if let Err(e) = self.journal.append_batch(&batch.events).await {
            tracing::error!(
                tick = inner.stamp.tick,
                discarded = batch.events.len(),
                "Batch not committed, rolling back: {e}"
            );
            inner.world = batch.checkpoint;
            return Err(e.into());
        }
        Ok(batch.events)
    }

    /// Drop the open batch and restore the world it started from.
    /// Returns how many staged events were discarded.
    pub async fn discard_batch(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let Some(batch) = inner.batch.take() else {
            return 0;
        };
        inner.world = batch.checkpoint;
        batch.events.len()
    }

    /// Tallies for the current tick so far.
    pub async fn tally(&self) -> TickTally {
        self.inner.lock().await.tally
    }

    /// Validate, arbitrate, journal and apply one command.
    ///
    /// # Errors
    ///
    /// Returns [`WorldStoreError`] only for fatal failures. Rejections come
    /// back as [`CommandOutcome::Rejected`] with zero events written.
    pub async fn submit_command(
        &self,
        command: &Command,
    ) -> Result<CommandOutcome, WorldStoreError> {
        let mut inner = self.inner.lock().await;
        let tick = inner.stamp.tick;

        let kinds = match arbitrate(&inner.world, &self.config, tick, &command.kind) {
            Ok(kinds) => kinds,
            Err(rejection) => {
                inner.tally.rejected = inner.tally.rejected.saturating_add(1);
                tracing::warn!(
                    tick,
                    command = command.kind.type_name(),
                    agent = command.agent_id.as_ref().map(AgentId::as_str),
                    code = rejection.code(),
                    "Command rejected: {rejection}"
                );
                return Ok(CommandOutcome::Rejected(rejection));
            }
        };

        let events = self
            .commit(&mut inner, command.agent_id.as_ref(), kinds)
            .await?;
        inner.tally.accepted = inner.tally.accepted.saturating_add(1);
        tracing::debug!(
            tick,
            command = command.kind.type_name(),
            events = events.len(),
            "Command accepted"
        );
        Ok(CommandOutcome::Accepted(events))
    }

    /// Journal and apply a system-generated event that needs no arbitration.
    ///
    /// # Errors
    ///
    /// Returns [`WorldStoreError`] if the journal fails.
    pub async fn record(
        &self,
        agent_id: Option<&AgentId>,
        kind: EventKind,
    ) -> Result<Event, WorldStoreError> {
        let mut inner = self.inner.lock().await;
        let event = self.factory.stamp(inner.stamp, agent_id.cloned(), kind);
        Self::write(&self.journal, &mut inner, core::slice::from_ref(&event)).await?;
        Ok(event)
    }

    /// Journal and apply several system-generated events in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`WorldStoreError`] if the journal fails.
    pub async fn record_batch(
        &self,
        agent_id: Option<&AgentId>,
        kinds: Vec<EventKind>,
    ) -> Result<Vec<Event>, WorldStoreError> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.lock().await;
        self.commit(&mut inner, agent_id, kinds).await
    }

    /// Point-in-time copy of one product.
    pub async fn read_snapshot(&self, product_id: &ProductId) -> Option<ProductState> {
        self.inner.lock().await.world.product(product_id).cloned()
    }

    /// Point-in-time copy of every product in key order.
    pub async fn products(&self) -> Vec<ProductState> {
        self.inner.lock().await.world.products().cloned().collect()
    }

    /// Point-in-time copy of the whole world.
    pub async fn world(&self) -> World {
        self.inner.lock().await.world.clone()
    }

    /// Stamp the events, then write them.
    async fn commit(
        &self,
        inner: &mut Inner,
        agent_id: Option<&AgentId>,
        kinds: Vec<EventKind>,
    ) -> Result<Vec<Event>, WorldStoreError> {
        let stamp = inner.stamp;
        let events: Vec<Event> = kinds
            .into_iter()
            .map(|kind| self.factory.stamp(stamp, agent_id.cloned(), kind))
            .collect();
        Self::write(&self.journal, inner, &events).await?;
        Ok(events)
    }

    /// With a batch open, apply and stage. Otherwise journal, then apply:
    /// the world is only touched once the journal has the whole slice.
    async fn write(
        journal: &Arc<dyn EventJournal>,
        inner: &mut Inner,
        events: &[Event],
    ) -> Result<(), WorldStoreError> {
        if inner.batch.is_none() {
            journal.append_batch(events).await?;
        }
        for event in events {
            inner.world.apply(event)?;
        }
        if let Some(batch) = inner.batch.as_mut() {
            batch.events.extend_from_slice(events);
        }
        Ok(())
    }
}
