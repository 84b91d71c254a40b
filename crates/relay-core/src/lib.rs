//! Shared data model for the relay orchestration core.
//!
//! This crate provides:
//! - The closed task/provider/rule/decision data model (§3 of the design doc)
//! - `TaskAnalyzer`, a pure complexity/token-estimate classifier
//! - The immutable `ProviderRegistry`
//! - `RelayError`, the closed error-kind enum shared by the router, manager
//!   and transports
//! - The `PatternStore` trait, a consumed-only interface over externally
//!   persisted routing history

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod analyzer;
pub mod error;
pub mod pattern;
pub mod prelude;
pub mod registry;
pub mod types;

pub use analyzer::{Complexity, TaskAnalysis, TaskAnalyzer};
pub use error::{RelayError, RelayResult};
pub use pattern::{PatternRecommendation, PatternStore};
pub use registry::{ProviderRegistry, expand_env};
pub use types::{
    DecisionSource, Method, ProviderDefinition, RoutingAction, RoutingDecision, RoutingRule,
    RuleComplexity, RuleMatch, Task, TaskOverrides, TaskType, Worker, WorkerStatus,
};
