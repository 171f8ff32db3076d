//! Durable `SQLite` journal backend.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so builds never need a live database. Each batch is written inside one
//! transaction on a single-connection pool, which makes the monotonic-tick
//! check and the inserts atomic with respect to other writers.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use flywheel_types::{AgentId, Event, EventCategory, EventId, SimulationId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::JournalError;
use crate::query::HistoryQuery;
use crate::record::{EventRecord, format_timestamp, parse_timestamp};
use crate::{EventJournal, JournalMaintenance, batch_runs, validate_batch};

const SCHEMA: [&str; 3] = [
    r"CREATE TABLE IF NOT EXISTS events (
        sequence      INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id      TEXT NOT NULL UNIQUE,
        simulation_id TEXT NOT NULL,
        tick          INTEGER NOT NULL,
        timestamp     TEXT NOT NULL,
        event_type    TEXT NOT NULL,
        category      TEXT NOT NULL,
        agent_id      TEXT,
        payload       TEXT NOT NULL,
        metadata      TEXT NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS idx_events_run_tick
        ON events (simulation_id, tick, sequence)",
    r"CREATE INDEX IF NOT EXISTS idx_events_run_type
        ON events (simulation_id, event_type, sequence)",
];

const SELECT_COLUMNS: &str = "SELECT sequence, event_id, simulation_id, tick, timestamp, \
     event_type, category, agent_id, payload, metadata FROM events WHERE simulation_id = ";

/// A row from the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Insertion sequence.
    pub sequence: i64,
    /// Event UUID as text.
    pub event_id: String,
    /// Run UUID as text.
    pub simulation_id: String,
    /// Tick number.
    pub tick: i64,
    /// RFC 3339 simulated timestamp.
    pub timestamp: String,
    /// Discriminator.
    pub event_type: String,
    /// Routing tag.
    pub category: String,
    /// Acting party, if any.
    pub agent_id: Option<String>,
    /// Payload JSON.
    pub payload: String,
    /// Metadata JSON object.
    pub metadata: String,
}

impl EventRow {
    /// Convert the raw row into a typed record.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Corrupt`] naming the sequence if any column
    /// fails to parse.
    pub fn into_record(self) -> Result<EventRecord, JournalError> {
        let sequence = u64::try_from(self.sequence).unwrap_or_default();
        let corrupt = |reason: String| JournalError::Corrupt { sequence, reason };

        let event_id = Uuid::parse_str(&self.event_id)
            .map_err(|e| corrupt(format!("bad event_id {:?}: {e}", self.event_id)))?;
        let simulation_id = Uuid::parse_str(&self.simulation_id)
            .map_err(|e| corrupt(format!("bad simulation_id {:?}: {e}", self.simulation_id)))?;
        let tick = u64::try_from(self.tick)
            .map_err(|e| corrupt(format!("bad tick {}: {e}", self.tick)))?;
        let category = EventCategory::parse(&self.category)
            .ok_or_else(|| corrupt(format!("unknown category {:?}", self.category)))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| corrupt(format!("payload is not JSON: {e}")))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| corrupt(format!("metadata is not a JSON object: {e}")))?;

        Ok(EventRecord {
            sequence,
            event_id: EventId(event_id),
            simulation_id: SimulationId(simulation_id),
            tick,
            timestamp: parse_timestamp(sequence, &self.timestamp)?,
            event_type: self.event_type,
            category,
            agent_id: self.agent_id.map(AgentId::new),
            payload,
            metadata,
        })
    }
}

/// An [`EventJournal`] stored in a `SQLite` database.
#[derive(Debug)]
pub struct SqliteJournal {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    initialized: AtomicBool,
}

impl SqliteJournal {
    /// Open (creating if missing) the database at `url`.
    ///
    /// `sqlite::memory:` gives an ephemeral database that lives as long as
    /// the journal. File databases use write-ahead logging.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Storage`] if the URL is invalid or the
    /// database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, JournalError> {
        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if !url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // One connection: in-memory databases are per-connection, and a
        // single writer keeps the tick check and inserts serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        tracing::info!(url, "Opened SQLite journal");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool. Call [`EventJournal::initialize`] before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_records(
        &self,
        simulation_id: SimulationId,
        query: &HistoryQuery,
    ) -> Result<Vec<EventRecord>, JournalError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push_bind(simulation_id.to_string());
        if let Some(from) = query.from_tick {
            builder.push(" AND tick >= ").push_bind(to_i64(from));
        }
        if let Some(until) = query.until_tick {
            builder.push(" AND tick <= ").push_bind(to_i64(until));
        }
        if !query.event_types.is_empty() {
            builder.push(" AND event_type IN (");
            let mut types = builder.separated(", ");
            for event_type in &query.event_types {
                types.push_bind(event_type.clone());
            }
            types.push_unseparated(")");
        }
        builder.push(" ORDER BY tick, sequence");
        if let Some(limit) = query.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<EventRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(EventRow::into_record).collect()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl EventJournal for SqliteJournal {
    async fn initialize(&self) -> Result<(), JournalError> {
        let _guard = self.write_lock.lock().await;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        self.initialized.store(true, Ordering::Release);
        tracing::debug!("Initialized journal schema");
        Ok(())
    }

    async fn append_batch(&self, events: &[Event]) -> Result<(), JournalError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(JournalError::Unavailable {
                reason: String::from("journal not initialized"),
            });
        }
        if events.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut stored = BTreeMap::new();
        for run in batch_runs(events) {
            let latest: Option<i64> =
                sqlx::query_scalar("SELECT MAX(tick) FROM events WHERE simulation_id = ?")
                    .bind(run.to_string())
                    .fetch_one(&mut *tx)
                    .await?;
            if let Some(latest) = latest {
                stored.insert(run, u64::try_from(latest).unwrap_or_default());
            }
        }
        validate_batch(events, &stored)?;

        for event in events {
            let record = EventRecord::encode(0, event)?;
            let inserted = sqlx::query(
                r"INSERT INTO events
                  (event_id, simulation_id, tick, timestamp, event_type, category, agent_id, payload, metadata)
                  VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.event_id.to_string())
            .bind(record.simulation_id.to_string())
            .bind(to_i64(record.tick))
            .bind(format_timestamp(record.timestamp))
            .bind(&record.event_type)
            .bind(record.category.as_str())
            .bind(record.agent_id.as_ref().map(|a| a.as_str().to_owned()))
            .bind(serde_json::to_string(&record.payload)?)
            .bind(serde_json::to_string(&record.metadata)?)
            .execute(&mut *tx)
            .await;

            // Dropping `tx` on any early return rolls the batch back.
            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(JournalError::DuplicateEventId {
                        event_id: record.event_id,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        tracing::debug!(count = events.len(), "Appended events to SQLite journal");
        Ok(())
    }

    async fn get_history(
        &self,
        simulation_id: SimulationId,
        query: &HistoryQuery,
    ) -> Result<Vec<Event>, JournalError> {
        self.fetch_records(simulation_id, query)
            .await?
            .iter()
            .map(EventRecord::decode)
            .collect()
    }

    async fn get_latest_tick(
        &self,
        simulation_id: SimulationId,
    ) -> Result<Option<u64>, JournalError> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(tick) FROM events WHERE simulation_id = ?")
                .bind(simulation_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(latest.map(|t| u64::try_from(t).unwrap_or_default()))
    }

    async fn export(&self, simulation_id: SimulationId) -> Result<Vec<EventRecord>, JournalError> {
        self.fetch_records(simulation_id, &HistoryQuery::new()).await
    }
}

#[async_trait]
impl JournalMaintenance for SqliteJournal {
    async fn purge_run(&self, simulation_id: SimulationId) -> Result<u64, JournalError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM events WHERE simulation_id = ?")
            .bind(simulation_id.to_string())
            .execute(&self.pool)
            .await?;
        tracing::info!(%simulation_id, removed = result.rows_affected(), "Purged run from journal");
        Ok(result.rows_affected())
    }
}
