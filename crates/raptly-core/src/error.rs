// ── Core error types ──
//
// Failures surfaced at the poll boundary. The api crate's closed taxonomy
// is wrapped, not flattened: hosts that need the underlying cause can match
// on `source`, everything else branches on the predicate helpers.

use thiserror::Error;

use raptly_api::Error as ApiError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A poll failed; the previous snapshot is retained.
    #[error("Update failed: {0}")]
    UpdateFailed(#[source] ApiError),

    /// Building the HTTP client failed before any poll could run.
    #[error("Client setup failed: {0}")]
    Setup(#[source] ApiError),
}

impl CoreError {
    /// The wrapped api-layer error.
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::UpdateFailed(e) | Self::Setup(e) => e,
        }
    }

    /// Returns `true` if re-entering credentials might resolve this error.
    /// Hosts use this to send the user back to the credential form instead
    /// of silently retrying.
    pub fn is_auth_failure(&self) -> bool {
        self.api_error().is_auth_failure()
    }

    /// Returns `true` for transient conditions worth retrying at the next
    /// scheduled poll.
    pub fn is_transient(&self) -> bool {
        self.api_error().is_transient()
    }
}
