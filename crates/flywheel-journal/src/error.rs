//! Error types for the event journal.
//!
//! [`JournalError`] separates malformed input (rejected before any write)
//! from storage failures (fatal to the run) and from records that can no
//! longer be decoded (surfaced explicitly so replay never skips data).

use flywheel_types::{EventId, EventValidationError, SimulationId};

/// Errors that can occur in the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// An event in the batch is structurally malformed.
    #[error("malformed event {event_id}: {source}")]
    Validation {
        /// The offending event.
        event_id: EventId,
        /// The broken rule.
        source: EventValidationError,
    },

    /// An event's tick is lower than one already recorded for its run.
    #[error("tick {tick} precedes latest tick {latest} for run {simulation_id}")]
    NonMonotonicTick {
        /// The run.
        simulation_id: SimulationId,
        /// Tick of the offending event.
        tick: u64,
        /// Highest tick already recorded.
        latest: u64,
    },

    /// An event ID is already present in the journal or repeated in a batch.
    #[error("duplicate event id {event_id}")]
    DuplicateEventId {
        /// The repeated ID.
        event_id: EventId,
    },

    /// The storage engine failed to commit or read.
    #[error("journal storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored record cannot be decoded back into an event.
    #[error("corrupt journal record at sequence {sequence}: {reason}")]
    Corrupt {
        /// Insertion sequence of the record.
        sequence: u64,
        /// What could not be decoded.
        reason: String,
    },

    /// A payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The journal cannot accept writes (not initialized or faulted).
    #[error("journal unavailable: {reason}")]
    Unavailable {
        /// Why the journal is unavailable.
        reason: String,
    },
}

impl JournalError {
    /// Whether the error was raised by input checks, before any write.
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NonMonotonicTick { .. } | Self::DuplicateEventId { .. }
        )
    }
}
