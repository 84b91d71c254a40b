//! Closed error-kind enum shared by the router, worker manager and transports.

use thiserror::Error;

/// Errors produced by the relay orchestration core.
///
/// This set is intentionally closed: callers match on it exhaustively
/// rather than treating it as an open hierarchy.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A task failed basic structural validation (empty description,
    /// unknown task type, contradictory overrides).
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// A referenced provider name is not present in the registry.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// `forceMethod` (or a rule action) named a method outside `{ACP,CLI,API}`.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// `forceModel` named a model that does not match the given provider.
    #[error("invalid model {model} for provider {provider}")]
    InvalidModel {
        /// The provider the model was checked against.
        provider: String,
        /// The model that failed to match.
        model: String,
    },

    /// Budget enforcement is active, no cheaper provider exists, and the
    /// remaining budget does not cover the decision's estimated cost.
    #[error(
        "insufficient budget for provider {provider}: remaining {remaining}, required {required}"
    )]
    InsufficientBudget {
        /// The provider the decision was made for.
        provider: String,
        /// Budget remaining at decision time.
        remaining: f64,
        /// Estimated cost of the decision.
        required: f64,
    },

    /// An ACP session failed to complete its `initialize`/`session/new`
    /// handshake.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A transport (subprocess, HTTP connection) failed after a worker
    /// was spawned.
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// A worker reported a terminal failure through its own protocol
    /// (non-zero exit, provider-side error response).
    #[error("worker failed: {0}")]
    WorkerFailed(String),

    /// The operation was cancelled, cooperatively or otherwise.
    #[error("cancelled")]
    Cancelled,

    /// No routing rule matched. Informational only: the router falls
    /// through to the default path and this variant is never returned
    /// to a caller of `Router::route`.
    #[error("no matching rule")]
    NoMatchingRule,

    /// A worker-lifecycle operation (`Prompt`/`Status`/`Output`/`Cancel`)
    /// named an id the manager has no record of, live or reaped.
    #[error("worker not found: {0}")]
    WorkerNotFound(String),
}

/// Convenience alias for results produced by this crate and its consumers.
pub type RelayResult<T> = Result<T, RelayError>;
