//! The persisted and exported shape of an event.
//!
//! [`EventRecord`] is what both backends store and what
//! [`EventJournal::export`] returns. The payload is kept as JSON so the
//! record is self-describing for external audit; converting back into an
//! [`Event`] re-parses it through the closed [`EventKind`] type and fails
//! loudly on any mismatch.
//!
//! [`EventJournal::export`]: crate::EventJournal::export

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use flywheel_types::{
    AgentId, Event, EventCategory, EventId, EventKind, SimulationId, TickStamp,
};
use serde::{Deserialize, Serialize};

use crate::error::JournalError;

/// One journal entry in its persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Insertion sequence (1-based, global to the journal).
    pub sequence: u64,
    /// Unique event identifier.
    pub event_id: EventId,
    /// Run the event belongs to.
    pub simulation_id: SimulationId,
    /// Tick the event happened in.
    pub tick: u64,
    /// Simulated time of the tick.
    pub timestamp: DateTime<Utc>,
    /// Discriminator.
    pub event_type: String,
    /// Routing tag.
    pub category: EventCategory,
    /// Acting party, if any.
    pub agent_id: Option<AgentId>,
    /// Variant-specific data.
    pub payload: serde_json::Value,
    /// Free-form context.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    /// Encode an event for storage at the given sequence.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Serialization`] if the payload cannot be
    /// encoded, or [`JournalError::Corrupt`] if it does not have the
    /// adjacently tagged shape.
    pub fn encode(sequence: u64, event: &Event) -> Result<Self, JournalError> {
        let payload = split_payload(sequence, serde_json::to_value(event.kind())?)?;
        Ok(Self {
            sequence,
            event_id: event.event_id(),
            simulation_id: event.simulation_id(),
            tick: event.tick(),
            timestamp: event.timestamp(),
            event_type: event.event_type().to_owned(),
            category: event.category(),
            agent_id: event.agent_id().cloned(),
            payload,
            metadata: event.metadata().clone(),
        })
    }

    /// Decode the record back into an immutable event.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Corrupt`] if the payload does not parse as
    /// the recorded discriminator or the stored category disagrees with it.
    pub fn decode(&self) -> Result<Event, JournalError> {
        let tagged = serde_json::json!({
            "event_type": self.event_type,
            "payload": self.payload,
        });
        let kind: EventKind =
            serde_json::from_value(tagged).map_err(|e| JournalError::Corrupt {
                sequence: self.sequence,
                reason: format!("payload does not match {}: {e}", self.event_type),
            })?;
        if kind.category() != self.category {
            return Err(JournalError::Corrupt {
                sequence: self.sequence,
                reason: format!(
                    "category {} does not match {} ({})",
                    self.category,
                    self.event_type,
                    kind.category()
                ),
            });
        }
        Ok(Event::from_parts(
            self.event_id,
            self.simulation_id,
            TickStamp {
                tick: self.tick,
                at: self.timestamp,
            },
            self.agent_id.clone(),
            kind,
            self.metadata.clone(),
        ))
    }

    /// Timestamp in the fixed textual form used by storage.
    pub fn timestamp_text(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

/// Render a timestamp the way every backend stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns [`JournalError::Corrupt`] if the text is not RFC 3339.
pub fn parse_timestamp(sequence: u64, text: &str) -> Result<DateTime<Utc>, JournalError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| JournalError::Corrupt {
            sequence,
            reason: format!("bad timestamp {text:?}: {e}"),
        })
}

/// Render records as newline-delimited JSON, one record per line.
///
/// Two runs with identical journals produce identical output.
///
/// # Errors
///
/// Returns [`JournalError::Serialization`] if a record cannot be encoded.
pub fn export_json_lines(records: &[EventRecord]) -> Result<String, JournalError> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record)?;
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{line}");
    }
    Ok(out)
}

/// Pull the `payload` member out of an adjacently tagged event value.
fn split_payload(sequence: u64, tagged: serde_json::Value) -> Result<serde_json::Value, JournalError> {
    match tagged {
        serde_json::Value::Object(mut map) => {
            map.remove("payload").ok_or_else(|| JournalError::Corrupt {
                sequence,
                reason: String::from("encoded event has no payload member"),
            })
        }
        other => Err(JournalError::Corrupt {
            sequence,
            reason: format!("encoded event is not an object: {other}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use flywheel_types::{EventFactory, ProductId};

    use super::*;

    fn sample_event() -> Event {
        let factory = EventFactory::new(SimulationId::derive("record", 1));
        factory.stamp(
            TickStamp {
                tick: 3,
                at: Utc.with_ymd_and_hms(2025, 1, 4, 0, 0, 0).unwrap(),
            },
            Some(AgentId::new("market")),
            EventKind::PriceChanged {
                product_id: ProductId::new("SKU-1"),
                previous_price: rust_decimal::Decimal::new(2000, 2),
                requested_price: rust_decimal::Decimal::new(1500, 2),
                new_price: rust_decimal::Decimal::new(1500, 2),
                clamped: false,
            },
        )
    }

    #[test]
    fn encode_then_decode_preserves_every_field() {
        let event = sample_event();
        let record = EventRecord::encode(7, &event).unwrap();
        assert_eq!(record.event_type, "price_changed");
        assert_eq!(record.category, EventCategory::Pricing);
        assert!(record.payload.get("event_type").is_none());

        let decoded = record.decode().unwrap();
        assert_eq!(decoded.event_id(), event.event_id());
        assert_eq!(decoded.kind(), event.kind());
        assert_eq!(decoded.agent_id(), event.agent_id());
        assert_eq!(decoded.timestamp(), event.timestamp());
    }

    #[test]
    fn mismatched_payload_is_reported_as_corrupt() {
        let mut record = EventRecord::encode(1, &sample_event()).unwrap();
        record.event_type = String::from("sale_recorded");
        let err = record.decode().unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { sequence: 1, .. }));
    }

    #[test]
    fn mismatched_category_is_reported_as_corrupt() {
        let mut record = EventRecord::encode(2, &sample_event()).unwrap();
        record.category = EventCategory::Sales;
        assert!(matches!(record.decode(), Err(JournalError::Corrupt { .. })));
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let text = format_timestamp(at);
        assert_eq!(parse_timestamp(0, &text).unwrap(), at);
        assert!(parse_timestamp(0, "yesterday").is_err());
    }
}
