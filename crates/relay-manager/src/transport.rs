//! The live transport handle backing a worker, exactly one per worker.

use std::sync::{Arc, Mutex as StdMutex};

use relay_transport_acp::AcpSession;
use relay_transport_api::ApiClient;
use relay_transport_cli::CliInvocation;

/// Paths an ACP worker's reverse `fs/write_text_file` calls have named,
/// in call order. Fed by the `WriteTracker` tool handler registered at
/// spawn time; CLI and API workers never populate one since neither
/// transport carries a reverse-tool-call channel.
pub type WritePaths = Arc<StdMutex<Vec<String>>>;

/// The transport a worker was routed to. A worker owns exactly one of
/// these, matching `decision.method` at spawn time.
#[derive(Clone)]
pub enum WorkerTransport {
    /// A long-lived JSON-RPC 2.0 session over the provider's stdio, plus
    /// the write paths observed through its reverse tool calls.
    Acp(Arc<AcpSession>, WritePaths),
    /// A deferred one-shot CLI invocation, executed on `Prompt`.
    Cli(Arc<CliInvocation>),
    /// A direct HTTP API client, called on `Prompt`.
    Api(Arc<ApiClient>),
}

impl WorkerTransport {
    /// Paths this worker has written to, as observed by the transport.
    /// Always empty for CLI and API workers.
    #[must_use]
    pub fn write_paths(&self) -> Vec<String> {
        match self {
            Self::Acp(_, paths) => paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone(),
            Self::Cli(_) | Self::Api(_) => Vec::new(),
        }
    }
}

impl std::fmt::Debug for WorkerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acp(..) => f.write_str("WorkerTransport::Acp"),
            Self::Cli(_) => f.write_str("WorkerTransport::Cli"),
            Self::Api(_) => f.write_str("WorkerTransport::Api"),
        }
    }
}
