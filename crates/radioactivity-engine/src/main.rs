//! Radioactivity engine binary.
//!
//! Wires the score store, aggregator, ingestion endpoint, emitter, decay
//! sweeper and HTTP API together and runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load and validate configuration from `radioactivity.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Open the score store (memory or `PostgreSQL`)
//! 4. Create the aggregator, ingestion endpoint and emitter
//! 5. Spawn the decay sweeper
//! 6. Start the HTTP server
//! 7. Wait for `Ctrl-C`, then drain and stop

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use radioactivity_core::aggregator::Aggregator;
use radioactivity_core::config::{EngineConfig, LoggingConfig, StoreBackend};
use radioactivity_core::emitter::Emitter;
use radioactivity_core::ingest::IngestionEndpoint;
use radioactivity_core::signing::IncidentSigner;
use radioactivity_core::store::{MemoryScoreStore, ScoreStore};
use radioactivity_core::sweep::run_sweeper;
use radioactivity_db::{PgScoreStore, PostgresConfig, PostgresPool};
use radioactivity_server::{AppState, ServerConfig, spawn_server};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "radioactivity.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or any subsystem fails to
/// start. Every such error is fatal.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging depends on it, so failures here are
    //    reported through the returned error.
    let config_path = config_path();
    let config = load_config(&config_path)?;
    config.validate()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        profile = ?config.decay.profile,
        half_life_secs = config.decay.half_life_secs,
        retention_secs = config.retention.retention_secs,
        backend = ?config.store.backend,
        "radioactivity-engine starting"
    );

    // 3. Open the score store.
    let (store, pg_pool) = open_store(&config).await?;
    info!(backend = store.backend_name(), "Score store ready");

    // 4. Aggregator, ingestion endpoint and emitter.
    let aggregator = Arc::new(Aggregator::from_config(Arc::clone(&store), &config)?);
    let ingest = IngestionEndpoint::from_config(Arc::clone(&aggregator), &config.ingest)?;
    let signer = config
        .ingest
        .secret
        .as_deref()
        .map(IncidentSigner::new)
        .transpose()?;
    let emitter = Emitter::new(config.emitter.clone(), signer)?;
    info!(
        signed = ingest.requires_signature(),
        emitter = emitter.settings().summary().join(", "),
        "Ingestion ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 5. Decay sweeper.
    let sweeper = if config.sweep.enabled {
        Some(tokio::spawn(run_sweeper(
            Arc::clone(&aggregator),
            config.sweep.interval(),
            shutdown_rx.clone(),
        )))
    } else {
        info!("Decay sweep disabled");
        None
    };

    // 6. HTTP server.
    let state = Arc::new(
        AppState::new(ingest, emitter).with_max_batch_size(config.server.max_batch_size),
    );
    let server = spawn_server(&ServerConfig::from(&config.server), state, shutdown_rx).await?;

    // 7. Run until Ctrl-C.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| EngineError::Signal {
            message: format!("{e}"),
        })?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    if let Err(e) = server.await {
        warn!(error = %e, "HTTP server task failed");
    }
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            warn!(error = %e, "Sweeper task failed");
        }
    }
    if let Some(pool) = pg_pool {
        pool.close().await;
    }

    info!("radioactivity-engine stopped");
    Ok(())
}

/// Configuration path from `RADIOACTIVITY_CONFIG`, or the default.
fn config_path() -> PathBuf {
    std::env::var_os("RADIOACTIVITY_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from `path`, falling back to defaults (plus
/// environment overrides) when the file does not exist.
fn load_config(path: &Path) -> Result<EngineConfig, EngineError> {
    if path.exists() {
        Ok(EngineConfig::from_file(path)?)
    } else {
        Ok(EngineConfig::parse("")?)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Open the configured score store. Also returns the `PostgreSQL` pool,
/// when there is one, so it can be closed on shutdown.
async fn open_store(
    config: &EngineConfig,
) -> Result<(Arc<dyn ScoreStore>, Option<PostgresPool>), EngineError> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = MemoryScoreStore::new(config.store.shards);
            info!(shards = store.shard_count(), "Using in-memory score store");
            let store: Arc<dyn ScoreStore> = Arc::new(store);
            Ok((store, None))
        }
        StoreBackend::Postgres => {
            let pool =
                PostgresPool::connect(&PostgresConfig::from_store_config(&config.store)).await?;
            pool.run_migrations().await?;
            let store: Arc<dyn ScoreStore> = Arc::new(PgScoreStore::new(pool.pool().clone()));
            Ok((store, Some(pool)))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config(Path::new("does/not/exist.yaml")).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn memory_backend_opens_without_a_database() {
        let mut config = EngineConfig::default();
        config.store.shards = 4;
        let (store, pool) = open_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(pool.is_none());
    }
}
