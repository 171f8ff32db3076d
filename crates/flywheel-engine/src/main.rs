//! Simulation binary for the Flywheel market simulation.
//!
//! Loads configuration, opens the `SQLite` journal, builds the orchestrator
//! with the configured catalog and built-in handlers, and runs the tick
//! loop until a termination condition is met.
//!
//! # Startup Sequence
//!
//! 1. Load and validate configuration (`flywheel-config.yaml` or the path
//!    given as the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Open the journal
//! 4. Build the orchestrator and install the Ctrl-C stop hook
//! 5. Run the simulation loop
//! 6. Verify replay, log the result and optionally export the journal

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use flywheel_core::config::LoggingConfig;
use flywheel_core::runner::{self, NoOpCallback};
use flywheel_core::{SimulationConfig, SimulationOrchestrator};
use flywheel_journal::{EventJournal, SqliteJournal, export_json_lines};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "flywheel-config.yaml";

/// Where to write the JSON-lines export, if set.
const EXPORT_PATH_ENV: &str = "FLYWHEEL_EXPORT_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, loaded) = load_config(&config_path)?;
    config.validate().context("invalid configuration")?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        path = %config_path.display(),
        from_file = loaded,
        world_name = config.world.name,
        seed = config.world.seed,
        simulation_id = %config.simulation_id(),
        products = config.catalog.len(),
        scheduled = config.schedule.len(),
        "Configuration loaded"
    );

    // 3. Open the journal.
    let journal = Arc::new(
        SqliteJournal::connect(&config.journal.url)
            .await
            .context("failed to open journal")?,
    );

    // 4. Build the orchestrator.
    let mut orchestrator = SimulationOrchestrator::from_config(&config, journal.clone())?;
    info!(handlers = ?orchestrator.handler_names(), "Orchestrator ready");

    let operator = Arc::clone(orchestrator.operator());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the in-flight tick");
            operator.request_stop();
        }
    });

    // 5. Run the simulation.
    let summary = runner::run_simulation(&mut orchestrator, &mut NoOpCallback).await?;
    runner::log_simulation_end(&summary);

    // 6. Verify and export.
    let replayed = orchestrator
        .verify_replay()
        .await
        .context("replay does not reproduce live state")?;
    info!(
        products = replayed.world.product_count(),
        ranked = replayed.rankings.len(),
        "Replay matches live state"
    );

    if let Ok(path) = std::env::var(EXPORT_PATH_ENV) {
        let records = journal.export(orchestrator.simulation_id()).await?;
        let lines = export_json_lines(&records)?;
        tokio::fs::write(&path, lines)
            .await
            .with_context(|| format!("failed to write export to {path}"))?;
        info!(path = %path, records = records.len(), "Journal exported");
    }

    journal.close().await;
    info!(
        end_reason = summary.end_reason.as_str(),
        total_ticks = summary.total_ticks,
        "flywheel-engine shutdown complete"
    );
    Ok(())
}

/// Load the configuration file, falling back to defaults when it is absent.
fn load_config(path: &Path) -> anyhow::Result<(SimulationConfig, bool)> {
    if path.exists() {
        let config = SimulationConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok((config, true))
    } else {
        let mut config = SimulationConfig::default();
        config.journal.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level {:?}", config.level))?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
