//! CLI transport errors.

use relay_core::RelayError;
use thiserror::Error;

/// Errors specific to the one-shot CLI transport.
#[derive(Debug, Error)]
pub enum CliError {
    /// The provider binary could not be spawned.
    #[error("failed to spawn provider process: {0}")]
    SpawnFailed(String),

    /// An I/O error occurred while waiting on or reading from the
    /// subprocess.
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    /// `run` was called a second time on an invocation that already ran.
    #[error("invocation already executed")]
    AlreadyExecuted,
}

/// Convenience alias for results produced by this crate.
pub type CliResult<T> = Result<T, CliError>;

impl From<CliError> for RelayError {
    fn from(err: CliError) -> Self {
        Self::TransportFailed(err.to_string())
    }
}
