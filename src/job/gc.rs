//! Periodic retention sweep for finished jobs.
//!
//! Same sleep-then-act shape as the teacher's batch daemon, minus the
//! cadence calculation: there is no fixed run time to wait for, just a
//! fixed-interval check.
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::manager::JobManager;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the background task that forgets terminal jobs past their
/// retention window. Runs until the process exits.
pub(crate) fn spawn_retention_sweep(manager: Arc<JobManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            debug!("running job retention sweep");
            manager.sweep_expired();
        }
    })
}
