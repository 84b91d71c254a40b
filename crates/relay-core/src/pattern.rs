//! `PatternStore`: the consumed-only interface over externally persisted
//! routing history. This crate defines the trait and value types only;
//! persistence, training and eviction policy live entirely outside this
//! workspace.

use async_trait::async_trait;

use crate::types::{Method, TaskType};

/// A recommendation returned by a `PatternStore` query.
#[derive(Debug, Clone)]
pub struct PatternRecommendation {
    /// Recommended provider name.
    pub provider: String,
    /// Recommended model.
    pub model: String,
    /// Recommended transport method.
    pub method: Method,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Estimated cost associated with this recommendation.
    pub estimated_cost: f64,
    /// Human-readable explanation, propagated into the resulting
    /// `RoutingDecision::reason` when the router accepts it.
    pub reason: String,
}

impl PatternRecommendation {
    /// Construct a recommendation, clamping confidence into `[0, 1]`.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        method: Method,
        confidence: f64,
        estimated_cost: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            method,
            confidence: confidence.clamp(0.0, 1.0),
            estimated_cost,
            reason: reason.into(),
        }
    }
}

/// Read-only interface over learned routing history.
///
/// Implementations live outside this workspace: pattern-data persistence
/// is explicitly out of scope for the orchestration core (see
/// SPEC_FULL.md). The router only ever calls `total_patterns` to decide
/// whether it has enough history to trust a query, then `query` itself.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Recommend a route for a task shape, or `None` if no pattern matches.
    async fn query(
        &self,
        task_type: TaskType,
        file_count: usize,
        estimated_tokens: usize,
    ) -> Option<PatternRecommendation>;

    /// Total number of patterns recorded. The router treats fewer than 5
    /// as insufficient history and skips the learning path entirely.
    async fn total_patterns(&self) -> usize;
}
