//! Worker lifecycle manager.
//!
//! `WorkerManager` is what turns a `Router`'s routing decision into a
//! live worker: it establishes the transport (ACP handshake, deferred
//! CLI invocation, or direct API client), tracks status/progress/output
//! against a worker table, and records the actual cost of each worker
//! back to the shared `BudgetLedger` exactly once it reaches a terminal
//! state.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod events;
mod manager;
mod output;
mod transport;
mod worker;
mod write_tracker;

pub use events::WorkerEvent;
pub use manager::WorkerManager;
pub use output::OutputBuffer;
pub use transport::{WorkerTransport, WritePaths};
pub use worker::WorkerRecord;
pub use write_tracker::WriteTracker;
