//! One-shot CLI provider invocation transport.
//!
//! Unlike the ACP transport, there is no persistent session: `Spawn`
//! only records the deferred invocation, and the provider binary is
//! executed exactly once, on `Prompt`, to completion or cancellation.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod invocation;

pub use error::{CliError, CliResult};
pub use invocation::{CliInvocation, CliOutcome};
