//! Registry sweep task
//!
//! Agents and controllers report on their own schedule and never say
//! goodbye. This task periodically evicts every session that has been
//! silent for longer than the offline threshold. Eviction only affects the
//! in-memory registry; the persisted node record is left as is. The same
//! tick drops expired geo-IP cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::NodeRegistry;
use crate::geoip::GeoIpCache;

/// Sessions silent for longer than this are evicted.
pub const OFFLINE_THRESHOLD: Duration = Duration::from_secs(7 * 60);

/// Default interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Run the sweep until `cancel` fires.
///
/// # Arguments
///
/// * `registry` - The registry to sweep
/// * `geo` - Geo-IP cache to purge of expired entries
/// * `period` - Time between sweeps
/// * `cancel` - Cancellation token for graceful shutdown
pub async fn run_registry_sweep(
    registry: Arc<NodeRegistry>,
    geo: Arc<GeoIpCache>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    tracing::info!(
        "Starting registry sweep (offline threshold: {:?}, interval: {:?})",
        registry.offline_threshold(),
        period
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let stats = registry.sweep(fleet_core::time::now());
                if stats.total() > 0 {
                    tracing::info!(
                        "Evicted {} agents and {} controllers",
                        stats.agents,
                        stats.controllers
                    );
                }
                let purged = geo.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {} expired geo-ip entries", purged);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Registry sweep shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::StaticGeoLocator;
    use chrono::Duration as ChronoDuration;
    use fleet_core::Node;

    #[test]
    fn test_offline_threshold_is_reasonable() {
        assert!(OFFLINE_THRESHOLD >= Duration::from_secs(60));
        assert!(OFFLINE_THRESHOLD <= Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_sweep_interval_is_reasonable() {
        assert!(SWEEP_INTERVAL >= Duration::from_secs(1));
        assert!(SWEEP_INTERVAL < OFFLINE_THRESHOLD);
    }

    #[tokio::test]
    async fn test_sweep_task_evicts_and_stops() {
        let registry = Arc::new(NodeRegistry::default());
        let stale = fleet_core::time::now() - ChronoDuration::minutes(30);
        registry.update_controller(&Node::new("stale"), stale);

        let geo = Arc::new(GeoIpCache::new(
            Arc::new(StaticGeoLocator::new()),
            Duration::from_secs(60),
            Duration::from_secs(1),
        ));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_registry_sweep(
            registry.clone(),
            geo,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.controller_count(), 0);

        cancel.cancel();
        task.await.unwrap();
    }
}
