//! Best-effort IP geolocation for session listings.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> anyhow::Result<Option<String>>;
}

/// Locator used when no lookup service is configured.
pub struct DisabledGeoLocator;

#[async_trait]
impl GeoLocator for DisabledGeoLocator {
    async fn locate(&self, _ip: IpAddr) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl GeoResponse {
    fn render(self) -> Option<String> {
        let parts: Vec<String> = [self.city, self.region, self.country]
            .into_iter()
            .flatten()
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Queries `GET {base}/{ip}` and renders "City, Region, Country".
pub struct HttpGeoLocator {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGeoLocator {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: IpAddr) -> anyhow::Result<Option<String>> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("geolocation URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .push(&ip.to_string());

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: GeoResponse = response.json().await?;
        Ok(body.render())
    }
}

/// Addresses worth sending to a public lookup service.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

/// Resolves a location without ever failing the caller. Lookup errors and
/// timeouts are logged and yield `None`.
pub async fn resolve_location(
    locator: &dyn GeoLocator,
    ip_address: Option<&str>,
    limit: Duration,
) -> Option<String> {
    let ip: IpAddr = ip_address?.parse().ok()?;
    if !is_public_ip(&ip) {
        return None;
    }

    match tokio::time::timeout(limit, locator.locate(ip)).await {
        Ok(Ok(location)) => location,
        Ok(Err(err)) => {
            tracing::debug!(error = ?err, %ip, "Geolocation lookup failed");
            None
        }
        Err(_) => {
            tracing::debug!(%ip, timeout_ms = limit.as_millis() as u64, "Geolocation lookup timed out");
            None
        }
    }
}
