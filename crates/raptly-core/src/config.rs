// ── Runtime monitoring configuration ──
//
// Describes *how* to poll the RAPT cloud for one account. Carries the
// credentials and the polling cadence, but never touches disk — the host
// constructs a `MonitorConfig` from its own credential storage and hands
// it in.

use std::time::Duration;

use secrecy::SecretString;

/// Default spacing between scheduled refreshes.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-request timeout for the underlying HTTP client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for monitoring a single RAPT account.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// RAPT portal username (email address).
    pub username: String,
    /// API secret generated in the RAPT portal.
    pub api_key: SecretString,
    /// How often the background task performs a refresh. Zero disables
    /// the background task; the host then calls refresh on its own cadence.
    pub update_interval: Duration,
    /// Request timeout for every outbound HTTP call.
    pub request_timeout: Duration,
}

impl MonitorConfig {
    /// Config with the default cadence and timeout.
    pub fn new(username: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            username: username.into(),
            api_key,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
