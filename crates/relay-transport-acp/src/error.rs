//! ACP transport errors.

use relay_core::RelayError;
use thiserror::Error;

/// Errors specific to the ACP transport.
#[derive(Debug, Error)]
pub enum AcpError {
    /// The `initialize` handshake failed (protocol mismatch or the
    /// subprocess exited before completing it).
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The subprocess could not be spawned, or its stdio pipes could not
    /// be captured.
    #[error("failed to spawn provider process: {0}")]
    SpawnFailed(String),

    /// A read or write on the subprocess's stdio pipes failed.
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line of ndjson could not be parsed as JSON.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The session was asked to send a request after it had already
    /// transitioned to `Closed`.
    #[error("session is closed")]
    Closed,

    /// A `session/prompt` call was made while another was still in
    /// flight.
    #[error("session is already prompting")]
    AlreadyPrompting,

    /// The server returned a JSON-RPC error in response to a request this
    /// session sent.
    #[error("provider returned error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
}

/// Convenience alias for results produced by this crate.
pub type AcpResult<T> = Result<T, AcpError>;

impl From<AcpError> for RelayError {
    fn from(err: AcpError) -> Self {
        match err {
            AcpError::HandshakeFailed(msg) => Self::HandshakeFailed(msg),
            AcpError::Remote { code, message } => {
                Self::WorkerFailed(format!("provider returned error {code}: {message}"))
            },
            AcpError::SpawnFailed(_)
            | AcpError::Io(_)
            | AcpError::MalformedMessage(_)
            | AcpError::Closed
            | AcpError::AlreadyPrompting => Self::TransportFailed(err.to_string()),
        }
    }
}
