//! Direct HTTP API provider transport.
//!
//! No handshake, no subprocess: `ApiClient` POSTs straight to a
//! `{baseURL}/chat/completions` endpoint and streams the response back
//! as a sequence of [`ApiEvent`]s.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiEvent};
pub use error::{ApiError, ApiResult};
