//! Process-wide geo-IP cache

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{GeoError, GeoLocator};

struct CachedCountry {
    country: String,
    expires_at: Instant,
}

/// Caches one country per address for a fixed TTL.
///
/// Entries are immutable snapshots: nothing refreshes them in the
/// background, an expired entry is refetched on the next lookup. Failed
/// lookups are not cached. Expired entries are dropped by
/// [`GeoIpCache::purge_expired`], which the registry sweep calls.
pub struct GeoIpCache {
    locator: Arc<dyn GeoLocator>,
    entries: DashMap<IpAddr, CachedCountry>,
    ttl: Duration,
    timeout: Duration,
}

impl GeoIpCache {
    /// Wrap `locator`; every fetch is bounded by `timeout`.
    pub fn new(locator: Arc<dyn GeoLocator>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            locator,
            entries: DashMap::new(),
            ttl,
            timeout,
        }
    }

    /// Country of `ip`, from the cache when fresh.
    pub async fn country(&self, ip: IpAddr) -> Result<String, GeoError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(&ip) {
            if now < entry.expires_at {
                return Ok(entry.country.clone());
            }
        }

        let country = match tokio::time::timeout(self.timeout, self.locator.country(ip)).await {
            Ok(result) => result?,
            Err(_) => return Err(GeoError::Timeout(ip)),
        };
        debug!("geo lookup {} -> {}", ip, country);

        self.entries.insert(
            ip,
            CachedCountry {
                country: country.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(country)
    }

    /// Region of an optional client address.
    ///
    /// `None` when there is no usable address or the lookup fails; lookup
    /// failures are logged.
    pub async fn region(&self, ip: Option<IpAddr>) -> Option<String> {
        let ip = ip?;
        match self.country(ip).await {
            Ok(country) => Some(country),
            Err(GeoError::Disabled) => None,
            Err(e) => {
                warn!("geo lookup for {} failed: {}", ip, e);
                None
            }
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of cached entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLocator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoLocator for CountingLocator {
        async fn country(&self, ip: IpAddr) -> Result<String, GeoError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if ip.is_loopback() {
                return Err(GeoError::Unknown(ip));
            }
            Ok(if n == 0 { "US" } else { "CA" }.to_string())
        }
    }

    struct SlowLocator;

    #[async_trait]
    impl GeoLocator for SlowLocator {
        async fn country(&self, _ip: IpAddr) -> Result<String, GeoError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("US".into())
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_served_until_expiry() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
        });
        let cache = GeoIpCache::new(
            locator.clone(),
            Duration::from_secs(1800),
            Duration::from_secs(3),
        );

        assert_eq!(cache.country(ip("8.8.8.8")).await.unwrap(), "US");
        tokio::time::advance(Duration::from_secs(1700)).await;
        assert_eq!(cache.country(ip("8.8.8.8")).await.unwrap(), "US");
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(cache.country(ip("8.8.8.8")).await.unwrap(), "CA");
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_expired() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
        });
        let cache = GeoIpCache::new(locator, Duration::from_secs(60), Duration::from_secs(3));

        cache.country(ip("8.8.8.8")).await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        cache.country(ip("1.1.1.1")).await.unwrap();
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
        });
        let cache = GeoIpCache::new(locator.clone(), Duration::from_secs(60), Duration::from_secs(3));

        assert_eq!(cache.region(Some(ip("127.0.0.1"))).await, None);
        assert_eq!(cache.region(Some(ip("127.0.0.1"))).await, None);
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.region(None).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out() {
        let cache = GeoIpCache::new(
            Arc::new(SlowLocator),
            Duration::from_secs(60),
            Duration::from_secs(3),
        );
        assert!(matches!(
            cache.country(ip("8.8.8.8")).await,
            Err(GeoError::Timeout(_))
        ));
    }
}
