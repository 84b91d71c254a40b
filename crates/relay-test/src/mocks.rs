//! Mock `PatternStore` for exercising the router's learning path.

use async_trait::async_trait;
use tokio::sync::Mutex;

use relay_core::{PatternRecommendation, PatternStore, TaskType};

/// A `PatternStore` double that always returns a fixed recommendation (or
/// none) and records every query it receives for later assertion.
pub struct RecordingPatternStore {
    total_patterns: usize,
    recommendation: Option<PatternRecommendation>,
    queries: Mutex<Vec<(TaskType, usize, usize)>>,
}

impl RecordingPatternStore {
    /// Construct a store reporting `total_patterns` history and returning
    /// `recommendation` (if any) from every `query` call.
    #[must_use]
    pub fn new(total_patterns: usize, recommendation: Option<PatternRecommendation>) -> Self {
        Self {
            total_patterns,
            recommendation,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// The `(task_type, file_count, estimated_tokens)` arguments of every
    /// `query` call made so far, in order.
    pub async fn recorded_queries(&self) -> Vec<(TaskType, usize, usize)> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl PatternStore for RecordingPatternStore {
    async fn query(
        &self,
        task_type: TaskType,
        file_count: usize,
        estimated_tokens: usize,
    ) -> Option<PatternRecommendation> {
        self.queries
            .lock()
            .await
            .push((task_type, file_count, estimated_tokens));
        self.recommendation.clone()
    }

    async fn total_patterns(&self) -> usize {
        self.total_patterns
    }
}
