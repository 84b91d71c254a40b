//! `WorkerRecord`: the live, internal counterpart to `relay_core::Worker`.

use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use relay_core::{Method, Task, Worker, WorkerStatus};
use tokio::sync::OwnedSemaphorePermit;

use crate::output::OutputBuffer;
use crate::transport::WorkerTransport;

/// A live worker, owned by the manager's worker table.
///
/// `relay_core::Worker` is the public, cheaply-cloned snapshot of this
/// type's identity and status; this type additionally owns the
/// transport handle, the output buffer, and the concurrency permit, none
/// of which are meaningful outside `relay-manager`.
#[derive(Debug)]
pub struct WorkerRecord {
    /// Worker id, a UUID rendered as a string.
    pub id: String,
    /// Provider this worker was routed to.
    pub provider: String,
    /// Transport method.
    pub method: Method,
    /// The task this worker was spawned for.
    pub task: Task,
    /// When this worker was spawned.
    pub started_at: DateTime<Utc>,
    /// Estimated cost computed by the router at spawn time, recorded to
    /// the budget ledger once the worker reaches a terminal state.
    pub estimated_cost: f64,
    status: StdMutex<WorkerStatus>,
    progress: StdMutex<(f64, Option<String>)>,
    cost_recorded: StdMutex<bool>,
    output: OutputBuffer,
    transport: WorkerTransport,
    permit: StdMutex<Option<OwnedSemaphorePermit>>,
}

impl WorkerRecord {
    /// Construct a freshly-spawned worker record in the `Ready` state.
    #[must_use]
    pub fn new(
        id: String,
        provider: String,
        method: Method,
        task: Task,
        transport: WorkerTransport,
        permit: OwnedSemaphorePermit,
        estimated_cost: f64,
    ) -> Self {
        Self {
            id,
            provider,
            method,
            task,
            started_at: Utc::now(),
            estimated_cost,
            status: StdMutex::new(WorkerStatus::Ready),
            progress: StdMutex::new((0.0, None)),
            cost_recorded: StdMutex::new(false),
            output: OutputBuffer::new(),
            transport,
            permit: StdMutex::new(Some(permit)),
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Move to a new status. A no-op once the worker has already reached
    /// a terminal status, since none of the three transports can revive
    /// a finished worker and a forced cancel racing a late terminal
    /// update from the transport itself must not clobber it.
    pub fn set_status(&self, status: WorkerStatus) {
        let mut current = self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if current.is_terminal() {
            return;
        }
        *current = status;
        drop(current);
        if status.is_terminal() {
            self.release_permit();
        }
    }

    /// Latest `(progress, step)` reported for this worker.
    #[must_use]
    pub fn progress(&self) -> (f64, Option<String>) {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Record a progress update.
    pub fn set_progress(&self, progress: f64, step: Option<String>) {
        *self
            .progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = (progress, step);
    }

    /// The worker's output buffer.
    #[must_use]
    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// The worker's transport handle.
    #[must_use]
    pub fn transport(&self) -> &WorkerTransport {
        &self.transport
    }

    /// Paths this worker has written to, per its transport's reverse
    /// tool calls. Always empty outside the ACP transport.
    #[must_use]
    pub fn write_paths(&self) -> Vec<String> {
        self.transport.write_paths()
    }

    /// Marks the cost as recorded, returning `true` the first time this
    /// is called for this worker and `false` on every subsequent call,
    /// so a caller can record at most once per worker.
    pub fn mark_cost_recorded(&self) -> bool {
        let mut recorded = self
            .cost_recorded
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *recorded {
            false
        } else {
            *recorded = true;
            true
        }
    }

    /// Releases the concurrency-limiting permit, if still held. Called
    /// automatically on entering a terminal status; idempotent.
    pub fn release_permit(&self) {
        let _ = self
            .permit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }

    /// A public, cloneable snapshot of this worker's identity and status.
    #[must_use]
    pub fn snapshot(&self) -> Worker {
        Worker {
            id: self.id.clone(),
            provider: self.provider.clone(),
            method: self.method,
            task: self.task.clone(),
            status: self.status(),
            started_at: self.started_at,
            estimated_cost: self.estimated_cost,
            cost_recorded: *self
                .cost_recorded
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }
}
