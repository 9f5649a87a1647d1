//! Location-history collector service.
//!
//! This crate provides a long-running service that:
//! - Subscribes to an MQTT topic hierarchy carrying device location updates
//! - Appends every update to a durable SQLite store, verbatim
//! - Periodically snapshots the store and ships the copy to off-site storage
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/tracklog/config.toml`:
//!
//! ```toml
//! [mqtt]
//! broker = "mqtt://localhost:1883"
//! topic_prefix = "owntracks"
//! qos = 1
//!
//! [storage]
//! path = "~/.local/share/tracklog/locations.db"
//!
//! [backup]
//! startup_delay_secs = 10
//! interval_secs = 86400
//! dir = "."
//! remote_folder = ""
//! ```
//!
//! The Dropbox access token is taken from the `DROPBOX_ACCESS_KEY`
//! environment variable; it never lives in the config file.

pub mod config;
pub mod ingest;
pub mod offload;
pub mod scheduler;
pub mod state;

pub use config::{BackupConfig, Config, ConfigError, MqttConfig, StorageConfig};
pub use ingest::Ingestor;
pub use offload::{DropboxSink, SnapshotSink, UploadError};
pub use scheduler::BackupScheduler;
pub use state::{AppState, Shutdown};
