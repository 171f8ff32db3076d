//! Configuration loading and typed config structures for the Flywheel simulation.
//!
//! The canonical configuration lives in `flywheel-config.yaml` at the project
//! root. Every field has a default, so an empty file describes a valid run
//! with an empty catalog. [`SimulationConfig::validate`] rejects values that
//! would make a run meaningless before any event is written.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use flywheel_market::RankingConfig;
use flywheel_types::{ProductId, SimulationId};
use flywheel_world::ArbitrationConfig;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::schedule::ScheduledCommand;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible run.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `flywheel-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run identity and seed.
    #[serde(default)]
    pub world: WorldConfig,

    /// Simulated time and real-time pacing.
    #[serde(default)]
    pub time: TimeConfig,

    /// When the run ends.
    #[serde(default)]
    pub bounds: BoundsConfig,

    /// Tick-scoped handler limits.
    #[serde(default)]
    pub handlers: HandlerConfig,

    /// Command arbitration limits.
    #[serde(default)]
    pub arbitration: ArbitrationConfig,

    /// Review, rank and visibility constants.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Built-in demand model.
    #[serde(default)]
    pub demand: DemandConfig,

    /// Built-in restocking policy.
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,

    /// Journal storage.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Products registered before the first tick.
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,

    /// Externally supplied commands keyed by tick.
    #[serde(default)]
    pub schedule: Vec<ScheduledCommand>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `FLYWHEEL_JOURNAL_URL` overrides `journal.url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.journal.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// The run identifier: explicit if configured, otherwise derived from
    /// the world name and seed.
    pub fn simulation_id(&self) -> SimulationId {
        self.world
            .simulation_id
            .unwrap_or_else(|| SimulationId::derive(&self.world.name, self.world.seed))
    }

    /// Reject configurations that cannot describe a run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problem = self
            .time
            .problems()
            .or_else(|| self.handlers.problems())
            .or_else(|| self.arbitration.problems())
            .or_else(|| self.ranking.problems())
            .or_else(|| self.demand.problems())
            .or_else(|| self.fulfillment.problems())
            .or_else(|| catalog_problems(&self.catalog));
        match problem {
            Some(reason) => Err(ConfigError::Invalid { reason }),
            None => Ok(()),
        }
    }
}

fn catalog_problems(catalog: &[CatalogEntry]) -> Option<String> {
    let mut seen = BTreeSet::new();
    for entry in catalog {
        if entry.product_id.is_empty() {
            return Some(String::from("catalog entry with an empty product_id"));
        }
        if !seen.insert(&entry.product_id) {
            return Some(format!("catalog lists {} twice", entry.product_id));
        }
        if entry.price <= Decimal::ZERO {
            return Some(format!("catalog price for {} must be positive", entry.product_id));
        }
        if entry.cost < Decimal::ZERO {
            return Some(format!("catalog cost for {} must not be negative", entry.product_id));
        }
    }
    None
}

/// Run identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for every random draw in the run.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Explicit run identifier. Derived from name and seed when absent.
    #[serde(default)]
    pub simulation_id: Option<SimulationId>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            simulation_id: None,
        }
    }
}

/// Simulated time and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeConfig {
    /// Simulated timestamp of tick 0.
    #[serde(default = "default_start_time")]
    pub start_time: DateTime<Utc>,

    /// Simulated seconds in one tick before acceleration.
    #[serde(default = "default_base_tick_seconds")]
    pub base_tick_seconds: u64,

    /// Multiplier applied to `base_tick_seconds`.
    #[serde(default = "default_time_acceleration")]
    pub time_acceleration: u64,

    /// Real-time milliseconds between ticks (0 = as fast as possible).
    #[serde(default)]
    pub tick_interval_ms: u64,
}

impl TimeConfig {
    fn problems(&self) -> Option<String> {
        if self.base_tick_seconds == 0 {
            return Some(String::from("time.base_tick_seconds must be at least 1"));
        }
        if self.time_acceleration == 0 {
            return Some(String::from("time.time_acceleration must be at least 1"));
        }
        None
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            base_tick_seconds: default_base_tick_seconds(),
            time_acceleration: default_time_acceleration(),
            tick_interval_ms: 0,
        }
    }
}

/// Simulation boundary configuration.
///
/// A value of 0 for either limit means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BoundsConfig {
    /// Maximum number of ticks before the simulation ends.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the simulation ends.
    #[serde(default)]
    pub max_real_time_seconds: u64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            max_real_time_seconds: 0,
        }
    }
}

/// Limits for tick-scoped handlers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandlerConfig {
    /// Milliseconds a handler has before its output for the tick is discarded.
    #[serde(default = "default_handler_timeout_ms")]
    pub timeout_ms: u64,
}

impl HandlerConfig {
    fn problems(&self) -> Option<String> {
        (self.timeout_ms == 0).then(|| String::from("handlers.timeout_ms must be at least 1"))
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_handler_timeout_ms(),
        }
    }
}

/// Demand model parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemandConfig {
    /// Whether the demand handler is registered.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Expected units per product per tick at neutral price and visibility.
    #[serde(default = "default_base_units_per_tick")]
    pub base_units_per_tick: f64,

    /// How strongly demand responds to price relative to the reference.
    #[serde(default = "default_price_elasticity")]
    pub price_elasticity: f64,

    /// Reference price as a multiple of unit cost.
    #[serde(default = "default_reference_markup")]
    pub reference_markup: Decimal,
}

impl DemandConfig {
    fn problems(&self) -> Option<String> {
        if !self.base_units_per_tick.is_finite() || self.base_units_per_tick < 0.0 {
            return Some(format!(
                "demand.base_units_per_tick {} must be >= 0",
                self.base_units_per_tick
            ));
        }
        if !self.price_elasticity.is_finite() || self.price_elasticity < 0.0 {
            return Some(format!(
                "demand.price_elasticity {} must be >= 0",
                self.price_elasticity
            ));
        }
        if self.reference_markup <= Decimal::ZERO {
            return Some(format!(
                "demand.reference_markup {} must be positive",
                self.reference_markup
            ));
        }
        None
    }
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_units_per_tick: default_base_units_per_tick(),
            price_elasticity: default_price_elasticity(),
            reference_markup: default_reference_markup(),
        }
    }
}

/// Restocking policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FulfillmentConfig {
    /// Whether the restock handler is registered.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Restock when on-hand inventory falls below this.
    #[serde(default = "default_reorder_point")]
    pub reorder_point: u64,

    /// Units ordered per restock.
    #[serde(default = "default_reorder_quantity")]
    pub reorder_quantity: u32,
}

impl FulfillmentConfig {
    fn problems(&self) -> Option<String> {
        (self.enabled && self.reorder_quantity == 0)
            .then(|| String::from("fulfillment.reorder_quantity must be at least 1"))
    }
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reorder_point: default_reorder_point(),
            reorder_quantity: default_reorder_quantity(),
        }
    }
}

/// Journal storage location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JournalConfig {
    /// `SQLite` connection URL.
    #[serde(default = "default_journal_url")]
    pub url: String,
}

impl JournalConfig {
    /// Override the URL with `FLYWHEEL_JOURNAL_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLYWHEEL_JOURNAL_URL") {
            self.url = val;
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            url: default_journal_url(),
        }
    }
}

/// A product registered at tick 0.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Product key.
    pub product_id: ProductId,
    /// Initial listed price.
    pub price: Decimal,
    /// Unit cost.
    pub cost: Decimal,
    /// Initial on-hand units.
    #[serde(default)]
    pub inventory: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    String::from("flywheel")
}

const fn default_seed() -> u64 {
    42
}

fn default_start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

const fn default_base_tick_seconds() -> u64 {
    86_400
}

const fn default_time_acceleration() -> u64 {
    1
}

const fn default_max_ticks() -> u64 {
    365
}

const fn default_handler_timeout_ms() -> u64 {
    1_000
}

const fn default_true() -> bool {
    true
}

const fn default_base_units_per_tick() -> f64 {
    5.0
}

const fn default_price_elasticity() -> f64 {
    1.5
}

const fn default_reference_markup() -> Decimal {
    Decimal::TWO
}

const fn default_reorder_point() -> u64 {
    20
}

const fn default_reorder_quantity() -> u32 {
    100
}

fn default_journal_url() -> String {
    String::from("sqlite::memory:")
}

fn default_log_level() -> String {
    String::from("info")
}
