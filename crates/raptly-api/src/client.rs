// RAPT cloud HTTP client
//
// Wraps `reqwest::Client` with the OAuth2 password-grant token lifecycle,
// the cloud's minimum inter-request spacing, and the four device-category
// fetch endpoints. All outbound data calls funnel through one rate gate so
// the spacing invariant holds across every caller sharing this client.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, preview};
use crate::records::{DeviceCategory, DeviceInventory, DeviceRecord};
use crate::transport::TransportConfig;

/// Production token endpoint (password grant).
pub const TOKEN_URL: &str = "https://id.rapt.io/connect/token";

/// Production base URL for the device endpoints.
pub const API_BASE_URL: &str = "https://api.rapt.io/api";

/// OAuth2 client identifier the cloud expects for password grants.
pub const OAUTH_CLIENT_ID: &str = "rapt-user";

/// Token lifetime assumed when the token response omits `expires_in`.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(2700);

/// Minimum spacing between the start times of successive requests.
pub const MIN_REQUEST_GAP: Duration = Duration::from_secs(15);

/// Successful password-grant response.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: Option<u64>,
}

/// A bearer token with its absolute expiry. Always replaced as a unit.
#[derive(Debug, Clone)]
struct SessionToken {
    access_token: String,
    expires_at: Instant,
}

/// Mutable session state: the token and the rate-gate clock.
///
/// Both live behind the same mutex so the "check spacing, sleep, stamp,
/// authenticate, send" sequence is serialized end to end.
#[derive(Debug, Default)]
struct SessionState {
    token: Option<SessionToken>,
    last_request_at: Option<Instant>,
}

/// Authenticated client for the RAPT cloud API.
///
/// Owns the credentials and the bearer-token lifecycle, enforces the
/// cloud's minimum inter-request spacing, and exposes one fetch method per
/// device category. The coordinator's scheduled refresh and any manual
/// discovery trigger share a single instance, so both queue on the same
/// rate gate.
pub struct RaptClient {
    http: reqwest::Client,
    token_url: Url,
    base_url: Url,
    username: String,
    api_key: SecretString,
    min_request_gap: Duration,
    session: Mutex<SessionState>,
}

impl RaptClient {
    /// Create a client for the production cloud endpoints.
    pub fn new(
        username: impl Into<String>,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let token_url = Url::parse(TOKEN_URL).expect("invalid token URL constant");
        let base_url = Url::parse(API_BASE_URL).expect("invalid API base URL constant");
        Ok(Self::with_client(http, token_url, base_url, username, api_key))
    }

    /// Create a client with a pre-built `reqwest::Client` and custom
    /// endpoints.
    ///
    /// Use this when the host manages its own connection pool, or to point
    /// the client at a test server.
    pub fn with_client(
        http: reqwest::Client,
        token_url: Url,
        base_url: Url,
        username: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            http,
            token_url,
            base_url,
            username: username.into(),
            api_key,
            min_request_gap: MIN_REQUEST_GAP,
            session: Mutex::new(SessionState::default()),
        }
    }

    /// Override the minimum spacing between outbound requests.
    ///
    /// Defaults to [`MIN_REQUEST_GAP`]; shorten it only when pointing the
    /// client at something other than the production cloud.
    pub fn with_min_request_gap(mut self, gap: Duration) -> Self {
        self.min_request_gap = gap;
        self
    }

    /// The device-endpoint base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Request a bearer token with the password grant and store it.
    ///
    /// On failure no token is stored; a previously stored token is left
    /// untouched and the next request will attempt authentication again.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        self.authenticate_session(&mut session).await.map(|_| ())
    }

    /// Re-authenticate iff no token exists or the token has expired.
    pub async fn ensure_authenticated(&self) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        self.ensure_session_token(&mut session).await.map(|_| ())
    }

    /// Best-effort credential check: authenticate, then issue one fetch.
    ///
    /// All errors are swallowed into `false` (logged at warn level) — this
    /// exists so a host's credential form can answer yes/no.
    pub async fn validate_connection(&self) -> bool {
        if let Err(e) = self.authenticate().await {
            warn!(error = %e, "connection validation failed");
            return false;
        }
        match self.list_temperature_controllers().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "connection validation fetch failed");
                false
            }
        }
    }

    /// Issue the grant and replace the stored (token, expiry) pair as a
    /// unit. Returns the fresh bearer string.
    async fn authenticate_session(&self, session: &mut SessionState) -> Result<String, Error> {
        debug!("requesting bearer token");
        let form = [
            ("client_id", OAUTH_CLIENT_ID),
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.api_key.expose_secret()),
        ];
        let resp = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = %preview(&body), "token endpoint refused the grant");
            let message = if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED
            {
                "invalid username or API key".to_string()
            } else {
                format!("token endpoint returned HTTP {status}")
            };
            return Err(Error::Authentication { message });
        }

        let body = resp.text().await?;
        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| Error::ResponseFormat {
            message: format!("token response: {e} (body preview: {:?})", preview(&body)),
        })?;

        let ttl = grant.expires_in.map_or(DEFAULT_TOKEN_TTL, Duration::from_secs);
        let token = SessionToken {
            access_token: grant.access_token,
            expires_at: Instant::now() + ttl,
        };
        let bearer = token.access_token.clone();
        session.token = Some(token);
        info!(ttl_secs = ttl.as_secs(), "authenticated with the RAPT cloud");
        Ok(bearer)
    }

    /// Return a valid bearer string, authenticating iff the stored token
    /// is absent or has reached its expiry instant.
    async fn ensure_session_token(&self, session: &mut SessionState) -> Result<String, Error> {
        if let Some(ref token) = session.token {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
            debug!("bearer token expired");
        }
        self.authenticate_session(session).await
    }

    // ── Rate-limited requests ────────────────────────────────────────

    /// Issue one request through the rate gate.
    ///
    /// The session lock is held across the sleep: the next caller must not
    /// read `last_request_at` until this request has stamped it. On a 401
    /// the client re-authenticates exactly once and retries exactly once;
    /// any failure of the retry is surfaced as a request error.
    async fn rate_limited_request(&self, method: Method, url: Url) -> Result<Value, Error> {
        let mut session = self.session.lock().await;

        if let Some(last) = session.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.min_request_gap {
                let wait = self.min_request_gap - elapsed;
                debug!(?wait, "rate gate: delaying request");
                sleep(wait).await;
            }
        }
        session.last_request_at = Some(Instant::now());

        let bearer = self.ensure_session_token(&mut session).await?;

        debug!("{method} {url}");
        let resp = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&bearer)
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(%url, "401 from data endpoint; re-authenticating and retrying once");
            let bearer = self.authenticate_session(&mut session).await?;
            let retry = self
                .http
                .request(method, url)
                .bearer_auth(&bearer)
                .send()
                .await?;
            let status = retry.status();
            if status != StatusCode::OK {
                let body = retry.text().await.unwrap_or_default();
                return Err(Error::Http {
                    status: status.as_u16(),
                    message: format!(
                        "request failed after re-authentication (HTTP {status}): {}",
                        preview(&body)
                    ),
                });
            }
            return decode_json(retry).await;
        }

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), &body));
        }
        decode_json(resp).await
    }

    // ── Device endpoints ─────────────────────────────────────────────

    /// Fetch the device records for one category.
    ///
    /// A payload that is not a JSON array of objects is decoded as an
    /// empty list rather than an error, so one category's shape drift
    /// cannot abort a whole poll.
    pub async fn list_devices(&self, category: DeviceCategory) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.api_url(category.endpoint_path());
        let payload = self.rate_limited_request(Method::GET, url).await?;
        let records = match serde_json::from_value::<Vec<DeviceRecord>>(payload) {
            Ok(records) => records,
            Err(e) => {
                warn!(%category, error = %e, "non-list payload; treating as empty");
                Vec::new()
            }
        };
        debug!(%category, count = records.len(), "fetched device records");
        Ok(records)
    }

    /// Fetch all temperature controllers.
    pub async fn list_temperature_controllers(&self) -> Result<Vec<DeviceRecord>, Error> {
        self.list_devices(DeviceCategory::TemperatureController)
            .await
    }

    /// Fetch all hydrometers.
    pub async fn list_hydrometers(&self) -> Result<Vec<DeviceRecord>, Error> {
        self.list_devices(DeviceCategory::Hydrometer).await
    }

    /// Fetch all fermentation chambers.
    pub async fn list_fermentation_chambers(&self) -> Result<Vec<DeviceRecord>, Error> {
        self.list_devices(DeviceCategory::FermentationChamber).await
    }

    /// Fetch all BrewZilla kettles.
    pub async fn list_brewzillas(&self) -> Result<Vec<DeviceRecord>, Error> {
        self.list_devices(DeviceCategory::BrewZilla).await
    }

    /// Fetch every category, sequentially.
    ///
    /// The four fetches share the rate gate, so they are issued one after
    /// another and the spacing invariant holds across the whole pass.
    pub async fn all_devices(&self) -> Result<DeviceInventory, Error> {
        let temperature_controllers = self.list_temperature_controllers().await?;
        let hydrometers = self.list_hydrometers().await?;
        let fermentation_chambers = self.list_fermentation_chambers().await?;
        let brewzillas = self.list_brewzillas().await?;
        Ok(DeviceInventory {
            temperature_controllers,
            hydrometers,
            fermentation_chambers,
            brewzillas,
        })
    }

    /// Build a full URL for a device-endpoint path.
    fn api_url(&self, path: &str) -> Url {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).expect("invalid API URL")
    }
}

/// Decode a success body as JSON, keeping a bounded preview on failure.
async fn decode_json(resp: reqwest::Response) -> Result<Value, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::ResponseFormat {
        message: format!("{e} (body preview: {:?})", preview(&body)),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn production_constants() {
        assert_eq!(MIN_REQUEST_GAP, Duration::from_secs(15));
        assert_eq!(DEFAULT_TOKEN_TTL, Duration::from_secs(45 * 60));
        assert_eq!(OAUTH_CLIENT_ID, "rapt-user");
    }

    #[test]
    fn new_targets_the_production_cloud() {
        let client = RaptClient::new(
            "brewer@example.com",
            SecretString::from("secret".to_string()),
            &TransportConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.rapt.io/api");
        assert_eq!(client.min_request_gap, MIN_REQUEST_GAP);
    }

    #[test]
    fn api_url_joins_category_paths() {
        let client = RaptClient::new(
            "brewer@example.com",
            SecretString::from("secret".to_string()),
            &TransportConfig::default(),
        )
        .unwrap();
        assert_eq!(
            client
                .api_url(DeviceCategory::Hydrometer.endpoint_path())
                .as_str(),
            "https://api.rapt.io/api/Hydrometers/GetHydrometers"
        );
    }

    #[test]
    fn token_grant_tolerates_missing_expiry() {
        let grant: TokenGrant =
            serde_json::from_str(r#"{"access_token":"tok"}"#).unwrap();
        assert_eq!(grant.access_token, "tok");
        assert_eq!(grant.expires_in, None);
        assert_eq!(
            grant.expires_in.map_or(DEFAULT_TOKEN_TTL, Duration::from_secs),
            Duration::from_secs(2700)
        );
    }
}
