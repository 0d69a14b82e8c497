//! Geo-IP lookups over HTTP

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{GeoError, GeoLocator};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocationResponse {
    data: LocationData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocationData {
    country: String,
}

/// Queries `<endpoint>?ip=<addr>` and reads `data.country` from the JSON answer
pub struct HttpGeoLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGeoLocator {
    /// Create a locator with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn country(&self, ip: IpAddr) -> Result<String, GeoError> {
        let response: LocationResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("ip", ip.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.data.country.is_empty() {
            return Err(GeoError::Unknown(ip));
        }
        Ok(response.data.country)
    }
}
