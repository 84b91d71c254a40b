//! Deterministic, rule-driven task router.
//!
//! `Router::route` evaluates, in order: caller overrides, a learned
//! pattern (if a `PatternStore` is attached and has enough history),
//! configured routing rules by descending priority, then a default
//! routing table. The resulting estimated cost is checked against the
//! attached `BudgetLedger`; when it does not fit, the router scans for a
//! cheaper substitute before giving up.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod cost;
pub mod defaults;
mod router;

pub use defaults::DefaultRoutes;
pub use router::Router;
