//! Prelude module - commonly used types for convenient import.
//!
//! Use `use relay_core::prelude::*;` to import the essentials.

pub use crate::{RelayError, RelayResult};

pub use crate::{Complexity, TaskAnalysis, TaskAnalyzer};

pub use crate::{PatternRecommendation, PatternStore};

pub use crate::{ProviderRegistry, expand_env};

pub use crate::{
    DecisionSource, Method, ProviderDefinition, RoutingAction, RoutingDecision, RoutingRule,
    RuleComplexity, RuleMatch, Task, TaskOverrides, TaskType, Worker, WorkerStatus,
};
