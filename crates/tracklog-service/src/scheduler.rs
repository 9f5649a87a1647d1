//! Recurring backup scheduler.
//!
//! A single task drives the backup lifecycle through three states:
//!
//! - **Armed**: exactly one timer is outstanding. The first arming uses the
//!   short startup delay; every later one uses the steady-state interval.
//! - **Firing**: the timer elapsed; one snapshot-and-upload cycle runs to
//!   completion (or error), then the scheduler re-arms. Re-arming happens
//!   regardless of the cycle's outcome, so one failed backup never stops
//!   future backups.
//! - **Cancelled**: the shutdown signal won the race against the outstanding
//!   timer. Terminal; a cycle that already started firing is allowed to
//!   finish.
//!
//! There is never more than one outstanding timer and never more than one
//! backup cycle in flight: the upload runs synchronously inside the cycle
//! that produced the snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::offload::{SnapshotSink, UploadError};
use crate::state::AppState;

/// Recurring backup scheduler handle.
pub struct BackupScheduler {
    state: Arc<AppState>,
    sink: Arc<dyn SnapshotSink>,
}

impl BackupScheduler {
    /// Create a new scheduler shipping snapshots into `sink`.
    pub fn new(state: Arc<AppState>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self { state, sink }
    }

    /// Start the scheduler task.
    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            run_backup_loop(state, sink).await;
        })
    }
}

/// Run the scheduler until cancelled.
async fn run_backup_loop(state: Arc<AppState>, sink: Arc<dyn SnapshotSink>) {
    let backup = state.config.backup.clone();
    let mut stop_rx = state.shutdown.subscribe();

    let mut delay = Duration::from_secs(backup.startup_delay_secs);
    info!("Backup scheduler armed, first cycle in {:?}", delay);

    loop {
        // Armed: one outstanding timer, raced against cancellation
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Backup scheduler cancelled");
                    return;
                }
                continue;
            }
        }

        // Firing: a failure abandons this cycle, never the scheduler
        match run_backup_cycle(&state, sink.as_ref()).await {
            Ok(path) => info!("Backup cycle finished: {}", path.display()),
            Err(e) => error!("Backup cycle failed: {}", e),
        }

        // Re-arm unconditionally
        delay = Duration::from_secs(backup.interval_secs);
        info!("Backup scheduler re-armed, next cycle in {:?}", delay);
    }
}

/// One snapshot-and-upload cycle.
///
/// The snapshot lands in the configured backup directory under a
/// timestamp-derived name and is kept there after the upload; local retention
/// is deliberately unbounded.
async fn run_backup_cycle(
    state: &AppState,
    sink: &dyn SnapshotSink,
) -> Result<PathBuf, CycleError> {
    let file_name = snapshot_file_name(OffsetDateTime::now_utc());
    let path = state.config.backup.dir.join(file_name);

    {
        let store = state.store.lock().await;
        let store = store.as_ref().ok_or(CycleError::StoreClosed)?;
        store.snapshot(&path).map_err(CycleError::Snapshot)?;
    }

    sink.upload(&path).await.map_err(CycleError::Upload)?;

    Ok(path)
}

/// Derive a snapshot file name from its capture instant.
fn snapshot_file_name(now: OffsetDateTime) -> String {
    let format = time::macros::format_description!(
        "backup-[year]-[month]-[day]-[hour]-[minute]-[second].sqlite"
    );
    now.format(&format)
        .expect("static format with in-range components")
}

/// Errors that abort a single backup cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Store is closed")]
    StoreClosed,
    #[error("Failed to snapshot: {0}")]
    Snapshot(tracklog_store::Error),
    #[error("Failed to upload: {0}")]
    Upload(UploadError),
}
