use thiserror::Error;

/// Top-level error type for the `raptly-api` crate.
///
/// A closed taxonomy: every failure the client can produce is one of these
/// four kinds, so callers match exhaustively (or use the predicate helpers)
/// instead of probing message text. `raptly-core` folds these into its
/// poll-boundary error.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The token endpoint rejected the password grant (wrong credentials,
    /// or an unexpected status from the identity service).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // ── Data endpoints ──────────────────────────────────────────────
    /// Non-success status from a data endpoint. The message is
    /// status-specific and carries a bounded excerpt of the response body.
    #[error("{message}")]
    Http { status: u16, message: String },

    // ── Decoding ────────────────────────────────────────────────────
    /// Body was not valid JSON, or a required field was missing.
    #[error("Invalid response format: {message}")]
    ResponseFormat { message: String },
}

impl Error {
    /// Map a non-success data-endpoint status to its error, keeping the
    /// response body in the message.
    pub(crate) fn http_status(status: u16, body: &str) -> Self {
        let body = preview(body);
        let message = match status {
            403 => format!("access forbidden: {body}"),
            404 => format!("endpoint not found: {body}"),
            s if s >= 500 => format!("server error (HTTP {s}): {body}"),
            s => format!("request failed (HTTP {s}): {body}"),
        };
        Self::Http { status, message }
    }

    /// Returns `true` if re-entering credentials might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` for transient conditions worth retrying at the next
    /// poll (network trouble, server-side 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the remote endpoint does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

/// Bounded body excerpt for error messages and logs.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
