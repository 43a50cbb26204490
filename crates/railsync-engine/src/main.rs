//! Engine binary for railsync.
//!
//! Wires the `PostgreSQL` store, the sync engine, and the observer server
//! together and runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `RAILSYNC_CONFIG` or `railsync.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the `PostgreSQL` store and the sync engine
//! 4. Connect, provision if configured, and log the roster
//! 5. Spawn the engine task
//! 6. Start the observer API server
//! 7. Wait for Ctrl-C, then shut the engine down cleanly

mod error;
mod log_subscriber;

use std::path::PathBuf;
use std::sync::Arc;

use railsync_core::config::{LoggingConfig, SyncConfig};
use railsync_core::engine::{DEFAULT_COMMAND_CAPACITY, SyncEngine, spawn_engine};
use railsync_db::PgStore;
use railsync_observer::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::log_subscriber::LogSubscriber;

/// Config file used when `RAILSYNC_CONFIG` is unset.
const DEFAULT_CONFIG_FILE: &str = "railsync.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the observer cannot be
/// started, or the engine task fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("railsync-engine starting");
    info!(
        host = %config.store.host,
        port = config.store.port,
        database = %config.store.database,
        connection = %config.store.connection_name,
        poll_mode = %config.polling.mode,
        health_check_interval_ms = config.polling.health_check_interval_ms,
        "Configuration loaded"
    );

    // 3. Build the store and engine.
    let store = PgStore::new(config.store.clone());
    let mut engine = SyncEngine::new(store, &config);
    engine.bus_mut().add_subscriber(Box::new(LogSubscriber::new()));

    // 4. Connect. A failure is not fatal: the health timer keeps retrying.
    match engine.connect().await {
        Ok(()) => log_roster(&mut engine).await,
        Err(e) => warn!(error = %e, "Initial connection failed, retrying on health checks"),
    }

    // 5. Spawn the engine task.
    let (handle, engine_task) = spawn_engine(engine, DEFAULT_COMMAND_CAPACITY);

    // 6. Start the observer API server.
    let observer_task = if config.observer.enabled {
        let state = Arc::new(AppState::new(handle.clone()));
        Some(railsync_observer::spawn_observer(&config.observer, state)?)
    } else {
        info!("Observer server disabled");
        None
    };

    // 7. Run until Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Engine already stopped");
    }
    engine_task.await.map_err(|e| EngineError::Task {
        message: format!("{e}"),
    })?;
    if let Some(task) = observer_task {
        task.abort();
    }

    info!("railsync-engine shutdown complete");
    Ok(())
}

/// Resolve the config file path from `RAILSYNC_CONFIG`, falling back to
/// `railsync.yaml` in the working directory.
fn config_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("RAILSYNC_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

/// Load configuration, using defaults (plus environment overrides) when
/// the file does not exist.
fn load_config() -> Result<SyncConfig, EngineError> {
    let path = config_path(|key| std::env::var(key).ok());
    if path.exists() {
        return Ok(SyncConfig::from_file(&path)?);
    }
    let mut config = SyncConfig::default();
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Log every signal and train once after the initial connection.
async fn log_roster(engine: &mut SyncEngine<PgStore>) {
    let Some(store) = engine.connected_store() else {
        return;
    };
    match store.load_signals().await {
        Ok(signals) => {
            for signal in &signals {
                info!(
                    signal_id = %signal.id,
                    name = %signal.name,
                    state = %signal.state,
                    section = signal.section.as_deref().unwrap_or("-"),
                    "Signal loaded"
                );
            }
            info!(count = signals.len(), "Signals loaded");
        }
        Err(e) => warn!(error = %e, "Failed to load signals"),
    }
    match store.load_trains().await {
        Ok(trains) => {
            for train in &trains {
                info!(
                    train_id = %train.id,
                    name = %train.name,
                    position = %train.position,
                    status = train.status.as_deref().unwrap_or("-"),
                    "Train loaded"
                );
            }
            info!(count = trains.len(), "Trains loaded");
        }
        Err(e) => warn!(error = %e, "Failed to load trains"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_prefers_environment() {
        let path = config_path(|key| {
            (key == "RAILSYNC_CONFIG").then(|| "/etc/railsync.yaml".to_owned())
        });
        assert_eq!(path, PathBuf::from("/etc/railsync.yaml"));
    }

    #[test]
    fn config_path_falls_back_to_working_directory() {
        assert_eq!(config_path(|_key| None), PathBuf::from(DEFAULT_CONFIG_FILE));
    }
}
