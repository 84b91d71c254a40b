//! The unified event stream `WorkerManager::prompt` returns, collapsing
//! the three transports' distinct update shapes into one.

use relay_core::WorkerStatus;

/// One update from an in-flight prompt, regardless of which transport is
/// backing the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Progress changed; `step` is a human-readable label when the
    /// transport provides one. CLI and API workers only ever report
    /// `0.0` until the terminal event, since neither protocol carries a
    /// progress signal.
    Progress {
        /// Monotonically increasing progress in `[0, 1]`.
        progress: f64,
        /// Optional human-readable step description.
        step: Option<String>,
    },
    /// A chunk of output text, already appended to the worker's output
    /// buffer by the time this event is sent.
    Output(String),
    /// The prompt reached a terminal state. The last event on the
    /// stream; the channel closes immediately after.
    Terminal(WorkerStatus),
}
