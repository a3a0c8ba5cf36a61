//! Scheduled cleanup of stale refresh token records.

use crate::refresh::RefreshStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
///
/// A record last written `max_age` ago can only hold an expired refresh
/// token, so `max_age` is the refresh token lifetime.
pub async fn run_cleanup(store: &dyn RefreshStore, max_age: Duration) {
    match store.purge_stale(max_age).await {
        Ok(count) if count > 0 => info!("Cleaned up {} stale refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up stale refresh tokens: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    store: Arc<dyn RefreshStore>,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup already ran cleanup
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(store.as_ref(), max_age).await;
        }
    })
}
