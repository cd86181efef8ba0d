//! Periodic connection verification.

use super::handshake::ConnectionManager;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Verify every connected remote each `interval` until `cancel` fires.
pub fn spawn_keep_alive(
    manager: Arc<ConnectionManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let remotes = manager.connected_endpoints();
            if remotes.is_empty() {
                continue;
            }
            tracing::debug!("verifying {} remotes", remotes.len());
            let checks = remotes.iter().map(|remote| manager.verify(remote, None));
            for (remote, result) in remotes.iter().zip(join_all(checks).await) {
                if let Err(e) = result {
                    tracing::debug!("keep-alive for {} failed: {}", remote, e);
                }
            }
        }
        tracing::debug!("keep-alive stopped");
    })
}
