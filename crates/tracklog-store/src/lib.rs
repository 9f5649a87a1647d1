//! Durable SQLite storage for location history records.
//!
//! This crate owns the on-disk table of location updates received over MQTT.
//! Records are opaque: one row per message, keyed by topic and the arrival
//! time assigned at insert. There is no update or delete path.
//!
//! Besides appends, the store can produce a consistent point-in-time copy of
//! itself via SQLite's online backup API, without pausing ingestion.
//!
//! # Example
//!
//! ```no_run
//! use tracklog_store::Store;
//!
//! let store = Store::open("locations.db")?;
//! store.append("owntracks/phone1", b"{\"lat\":52.5}")?;
//! store.snapshot("backup-2026-08-06-12-00-00.sqlite")?;
//! # Ok::<(), tracklog_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::LocationRecord;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/tracklog/locations.db`
/// - macOS: `~/Library/Application Support/tracklog/locations.db`
/// - Windows: `C:\Users\<user>\AppData\Local\tracklog\locations.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tracklog")
        .join("locations.db")
}
