use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::LivenessConfig;
use crate::ws::registry::ConnectionRegistry;

/// Spawn the liveness supervisor.
///
/// Every `heartbeat_interval` a Ping frame goes to each connection (a send
/// failure evicts at once); every `sweep_interval` connections idle for
/// longer than `inactivity_timeout` are evicted. Runs until `cancel` fires.
pub fn start_heartbeat(
    registry: Arc<ConnectionRegistry>,
    config: LivenessConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut ping = interval_at(start + config.heartbeat_interval, config.heartbeat_interval);
        let mut sweep = interval_at(start + config.sweep_interval, config.sweep_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    let count = registry.connection_count().await;
                    tracing::debug!(count, "WebSocket heartbeat ping");
                    let failed = registry.ping_all().await;
                    if !failed.is_empty() {
                        tracing::debug!(
                            evicted = failed.len(),
                            "Evicted connections that failed ping"
                        );
                    }
                }
                _ = sweep.tick() => {
                    sweep_inactive(&registry, config.inactivity_timeout).await;
                }
                () = cancel.cancelled() => {
                    tracing::info!("Heartbeat supervisor stopping");
                    break;
                }
            }
        }
    })
}

/// Evict every connection idle for longer than `threshold`.
///
/// Returns the number of evicted connections.
pub async fn sweep_inactive(registry: &ConnectionRegistry, threshold: Duration) -> usize {
    let evicted = registry.evict_inactive(threshold).await;
    for conn_id in &evicted {
        tracing::info!(conn_id = %conn_id, "Evicted inactive WebSocket connection");
    }
    if !evicted.is_empty() {
        let remaining = registry.connection_count().await;
        tracing::info!(
            evicted = evicted.len(),
            remaining,
            "Inactivity sweep finished"
        );
    }
    evicted.len()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::ws::Message;

    use super::*;

    fn liveness() -> LivenessConfig {
        LivenessConfig {
            heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
            inactivity_timeout: Duration::from_secs(600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_interval() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_id, mut rx) = registry.register("u1").await;
        let cancel = CancellationToken::new();
        let handle = start_heartbeat(Arc::clone(&registry), liveness(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_matches!(rx.try_recv(), Ok(Message::Ping(_)));
        assert_matches!(rx.try_recv(), Ok(Message::Ping(_)));
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_is_evicted_by_sweep() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (silent, _rx_silent) = registry.register("u1").await;
        let (chatty, _rx_chatty) = registry.register("u2").await;
        registry.join(&silent, "s1").await.unwrap();
        registry.join(&chatty, "s1").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = start_heartbeat(Arc::clone(&registry), liveness(), cancel.clone());

        for _ in 0..9 {
            tokio::time::sleep(Duration::from_secs(100)).await;
            registry.touch(&chatty).await;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!registry.contains(&silent).await);
        assert!(registry.contains(&chatty).await);
        let members = registry.members_of("s1").await;
        assert!(!members.contains(&silent));
        assert_eq!(members.len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_inactive_respects_threshold() {
        let registry = ConnectionRegistry::new();
        let (_id, _rx) = registry.register("u1").await;

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(sweep_inactive(&registry, Duration::from_secs(600)).await, 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(sweep_inactive(&registry, Duration::from_secs(600)).await, 1);
        assert_eq!(sweep_inactive(&registry, Duration::from_secs(600)).await, 0);
    }

    #[tokio::test]
    async fn cancelled_supervisor_exits() {
        let registry = Arc::new(ConnectionRegistry::new());
        let cancel = CancellationToken::new();
        let handle = start_heartbeat(registry, liveness(), cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
