//! Scheduled cleanup of expired session records.
//!
//! Expired records are already refused at read time; this only reclaims
//! space.

use crate::db::SessionLedger;
use crate::jwt::now_secs;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(ledger: &SessionLedger) {
    match ledger.delete_expired(now_secs()).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired session records", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired session records: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(ledger: SessionLedger) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&ledger).await;
        }
    })
}
