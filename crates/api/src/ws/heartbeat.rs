use std::sync::Arc;
use std::time::Duration;

use crate::ws::registry::ConnectionRegistry;

/// Spawn a background task that sends periodic Ping frames to all connected
/// WebSocket clients.
///
/// Connections whose queues cannot take the ping are dropped, which is how
/// stalled clients get noticed between edits. The returned `JoinHandle` is
/// aborted during shutdown.
pub fn start_heartbeat(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = registry.ping_all();
            tracing::debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "WebSocket heartbeat ping"
            );
        }
    })
}
