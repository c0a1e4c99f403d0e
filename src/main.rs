mod bluetooth;
mod clock;
mod config;
mod database;
mod error;
mod models;
mod pipeline;
mod supervisor;
mod utils;

#[cfg(test)]
mod testing;

use log::{error, info, warn};
use std::process::ExitCode;
use tokio::sync::watch;

use bluetooth::BluerTransport;
use clock::SystemClock;
use config::SessionConfig;
use database::PostgresStore;
use error::{ConfigError, SessionError};
use supervisor::supervise;

async fn run(config: SessionConfig, store: PostgresStore) -> Result<(), SessionError> {
    info!(
        "Bridging SensorTag {} to {}.{} every {}s",
        config.address, config.database_name, config.table, config.send_interval_secs
    );

    // Handle Ctrl+C gracefully
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    if !prepare_table(&store, &mut rx.clone()).await {
        info!("Interrupted while preparing the table");
        return Ok(());
    }

    let transport = BluerTransport::new(config.discovery_timeout)
        .await
        .map_err(SessionError::AdapterUnavailable)?;

    supervise(&config, &transport, &store, &SystemClock, rx).await
}

/// Create the readings table unless an interrupt arrives first.
///
/// Returns `false` when interrupted. A failed check only warns and writes
/// keep retrying.
async fn prepare_table(store: &PostgresStore, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        Ok(_) = shutdown.wait_for(|stop| *stop) => false,
        prepared = store.ensure_table() => {
            if let Err(e) = prepared {
                warn!("Could not prepare table, writes will keep trying: {}", e);
            }
            true
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match SessionConfig::new() {
        Ok(config) => config,
        Err(ConfigError::Usage(usage)) => {
            println!("{}", usage);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    let store = match PostgresStore::new(
        &config.database_url,
        &config.database_name,
        &config.table,
        config.store_retry,
    ) {
        Ok(store) => store,
        Err(e) => {
            error!("Invalid storage configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(config, store).await {
        Ok(()) => {
            info!("Exiting ...");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Session ended: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
