//! Geo-IP lookups
//!
//! Country lookups are delegated to a [`GeoLocator`]. The control plane
//! talks to it through [`GeoIpCache`], which keeps one immutable answer per
//! address for a fixed TTL and refetches lazily once it expires.

mod cache;
mod client_ip;
mod http;

pub use cache::GeoIpCache;
pub use client_ip::{client_ip, is_private_ip};
pub use http::HttpGeoLocator;

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;

/// Errors from a geo-IP lookup
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// No lookup service is configured
    #[error("geo lookup disabled")]
    Disabled,

    /// The lookup request failed
    #[error("geo lookup request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The lookup service did not answer in time
    #[error("geo lookup for {0} timed out")]
    Timeout(IpAddr),

    /// The service answered without a country
    #[error("no country known for {0}")]
    Unknown(IpAddr),
}

/// Resolves an address to an ISO country code
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Country code of `ip`
    async fn country(&self, ip: IpAddr) -> Result<String, GeoError>;
}

/// Locator answering from a fixed table
///
/// Used when no lookup endpoint is configured and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLocator {
    countries: HashMap<IpAddr, String>,
    fallback: Option<String>,
}

impl StaticGeoLocator {
    /// A locator that knows nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `country` for `ip`
    pub fn with_country(mut self, ip: IpAddr, country: impl Into<String>) -> Self {
        self.countries.insert(ip, country.into());
        self
    }

    /// Answer `country` for every address not in the table
    pub fn with_fallback(mut self, country: impl Into<String>) -> Self {
        self.fallback = Some(country.into());
        self
    }
}

#[async_trait]
impl GeoLocator for StaticGeoLocator {
    async fn country(&self, ip: IpAddr) -> Result<String, GeoError> {
        self.countries
            .get(&ip)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or(GeoError::Unknown(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_locator() {
        let us: IpAddr = "8.8.8.8".parse().unwrap();
        let other: IpAddr = "1.1.1.1".parse().unwrap();

        let locator = StaticGeoLocator::new().with_country(us, "US");
        assert_eq!(locator.country(us).await.unwrap(), "US");
        assert!(matches!(
            locator.country(other).await,
            Err(GeoError::Unknown(_))
        ));

        let locator = locator.with_fallback("DE");
        assert_eq!(locator.country(other).await.unwrap(), "DE");
    }
}
