// Transport configuration for building reqwest::Client instances.
//
// The RAPT cloud sits behind a public CA, so there is no TLS knob here —
// just the request timeout that bounds both the token grant and every data
// call issued through the same client.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("raptly/", env!("CARGO_PKG_VERSION"));

/// Configuration for the HTTP client shared by all requests.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total per-request timeout (connect + response body).
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Network)
    }
}
