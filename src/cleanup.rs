//! Scheduled cleanup of expired password reset tokens.

use std::time::Duration;

use tracing::{error, info};

use crate::db::{Database, PasswordResetTokenRepository};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    match db.reset_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!(count, "Cleaned up expired password reset tokens"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to clean up expired password reset tokens"),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick fires immediately and startup already ran a pass
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
