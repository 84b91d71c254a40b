//! Agent Communication Protocol transport.
//!
//! `AcpSession` hand-rolls a JSON-RPC 2.0 state machine over ndjson stdio:
//! the handshake (`initialize`/`authenticate`/`session/new`), prompting
//! (`session/prompt` plus streamed `session/update` notifications),
//! cancellation, and the provider's reverse tool calls
//! (`fs/read_text_file`, `fs/write_text_file`, `terminal/execute`,
//! `permission/request`). This is a different, simpler protocol than MCP;
//! nothing here depends on an MCP SDK.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod framing;
pub mod protocol;
pub mod session;

pub use error::{AcpError, AcpResult};
pub use session::{AcpSession, PermissionDecision, PermissionHandler, SessionState, SessionUpdate, TerminalOutcome, ToolHandler};

#[cfg(test)]
mod tests;
