//! tracklog - MQTT location-history collector with scheduled off-site
//! backups.
//!
//! Run with: `cargo run -p tracklog-service`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tracklog_service::offload::ACCESS_KEY_ENV;
use tracklog_service::{AppState, BackupScheduler, Config, DropboxSink, Ingestor};
use tracklog_store::Store;

/// MQTT location-history collector with scheduled off-site backups.
#[derive(Parser, Debug)]
#[command(name = "tracklog")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// MQTT broker URL (overrides config).
    #[arg(short, long)]
    broker: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tracklog_service=info".parse()?)
                .add_directive("tracklog_store=info".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(broker) = args.broker {
        config.mqtt.broker = broker;
    }

    config.validate()?;

    // The upload credential comes from the environment, never the config
    // file; a missing token is fatal at startup.
    let access_token = std::env::var(ACCESS_KEY_ENV)
        .map_err(|_| anyhow::anyhow!("Set {} to your Dropbox access key", ACCESS_KEY_ENV))?;

    // Snapshots land here; make sure it exists before the first cycle
    std::fs::create_dir_all(&config.backup.dir)?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    // Create application state
    let state = AppState::new(store, config.clone());

    // Start the backup scheduler
    let sink = Arc::new(DropboxSink::new(
        access_token,
        config.backup.remote_folder.clone(),
    ));
    BackupScheduler::new(Arc::clone(&state), sink).start();

    // Start the ingestion loop
    let mut ingest = Ingestor::new(Arc::clone(&state)).start();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            state.shutdown.trigger();
            let _ = ingest.await;
        }
        _ = &mut ingest => {
            // Transport loop ended on its own (e.g. unusable broker URL);
            // cancel the scheduler too
            state.shutdown.trigger();
        }
    }

    state.close_store().await?;
    info!("Shutdown complete");

    Ok(())
}
