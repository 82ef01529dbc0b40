//! Background maintenance for the rate limiters.
//!
//! Keyed limiters keep one entry per key ever seen. This task periodically
//! drops entries whose quota has fully recharged, so memory tracks recently
//! active keys rather than every key since startup.

use crate::server::RelayServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn the limiter maintenance task.
///
/// Stops when the relay shuts down. Returns a handle that can be used to
/// abort the task.
pub fn spawn_cleanup_task(relay: Arc<RelayServer>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval_secs = relay.config().limits.limiter_cleanup_interval_secs;
        tracing::info!("Limiter cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately
        timer.tick().await;

        loop {
            tokio::select! {
                _ = relay.stopped() => break,
                _ = timer.tick() => {
                    let limits = relay.rate_limits();
                    let before = limits.connection_keys_count() + limits.message_keys_count();
                    limits.shrink();
                    let after = limits.connection_keys_count() + limits.message_keys_count();
                    tracing::debug!("Limiter cleanup: {} -> {} tracked keys", before, after);
                }
            }
        }

        tracing::debug!("Limiter cleanup task stopped");
    })
}
