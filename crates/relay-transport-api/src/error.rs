//! Direct-API transport errors.

use relay_core::RelayError;
use thiserror::Error;

/// Errors specific to the direct HTTP API transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential env var was configured for this provider.
    #[error("no api key configured for provider {0}")]
    MissingApiKey(String),

    /// The underlying HTTP call failed (connection, TLS, timeout).
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint returned a non-2xx status.
    #[error("http {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Response body, best-effort captured for diagnostics.
        body: String,
    },

    /// `complete` was called a second time on a client already in flight.
    #[error("request already in flight")]
    AlreadyRunning,
}

/// Convenience alias for results produced by this crate.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<ApiError> for RelayError {
    fn from(err: ApiError) -> Self {
        Self::TransportFailed(err.to_string())
    }
}
