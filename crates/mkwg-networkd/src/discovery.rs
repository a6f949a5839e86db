//! Public address discovery.

use std::net::IpAddr;
use std::time::Duration;

use tracing::debug;

use crate::error::{NetworkdError, Result};

/// Finds the address clients should use to reach this host.
#[allow(async_fn_in_trait)]
pub trait AddressDiscovery {
    /// Returns the host's public IP address.
    async fn discover_public_ip(&self) -> Result<IpAddr>;
}

/// Asks an HTTP echo service such as icanhazip for the caller's address.
#[derive(Debug, Clone)]
pub struct HttpAddressDiscovery {
    client: reqwest::Client,
    url: String,
}

impl HttpAddressDiscovery {
    /// Default echo service.
    pub const DEFAULT_URL: &'static str = "http://icanhazip.com/";
    /// Request timeout.
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a discovery client for `url`.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| NetworkdError::Discovery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Parses an echo service response body.
fn parse_address(body: &str) -> Result<IpAddr> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(NetworkdError::Discovery("empty response".to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| NetworkdError::Discovery(format!("not an IP address: {trimmed:?}")))
}

impl AddressDiscovery for HttpAddressDiscovery {
    async fn discover_public_ip(&self) -> Result<IpAddr> {
        debug!(url = %self.url, "discovering public address");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NetworkdError::Discovery(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| NetworkdError::Discovery(e.to_string()))?;
        parse_address(&body)
    }
}

/// Returns a fixed answer. Used in tests and when the endpoint is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddressDiscovery {
    address: Option<IpAddr>,
}

impl StaticAddressDiscovery {
    /// Always answers `address`.
    pub fn new(address: IpAddr) -> Self {
        Self {
            address: Some(address),
        }
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self { address: None }
    }
}

impl AddressDiscovery for StaticAddressDiscovery {
    async fn discover_public_ip(&self) -> Result<IpAddr> {
        self.address
            .ok_or_else(|| NetworkdError::Discovery("no address configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("203.0.113.7\n", "203.0.113.7" ; "ipv4 with newline")]
    #[test_case("  2001:db8::1 \r\n", "2001:db8::1" ; "ipv6 padded")]
    fn parses_echo_body(body: &str, expected: &str) {
        let expected: IpAddr = expected.parse().expect("ip");
        assert_eq!(parse_address(body).expect("parse"), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("\n" ; "blank")]
    #[test_case("<html>rate limited</html>" ; "html")]
    fn rejects_bad_body(body: &str) {
        assert!(matches!(parse_address(body), Err(NetworkdError::Discovery(_))));
    }

    #[tokio::test]
    async fn unreachable_service_fails() {
        let discovery = HttpAddressDiscovery::new("http://127.0.0.1:1/").expect("client");
        let err = discovery.discover_public_ip().await.expect_err("refused");
        assert!(matches!(err, NetworkdError::Discovery(_)));
    }

    #[tokio::test]
    async fn static_discovery() {
        let ip: IpAddr = "198.51.100.4".parse().expect("ip");
        assert_eq!(
            StaticAddressDiscovery::new(ip).discover_public_ip().await.expect("ip"),
            ip
        );
        assert!(StaticAddressDiscovery::failing().discover_public_ip().await.is_err());
    }
}
