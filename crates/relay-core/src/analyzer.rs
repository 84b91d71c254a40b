//! Pure task-complexity and token-estimate classification.

use crate::types::{Task, TaskType};

/// Estimated context tokens contributed per context file.
const TOKENS_PER_FILE: usize = 2_000;
/// Estimated context tokens contributed per word of description.
const TOKENS_PER_DESCRIPTION_WORD: usize = 4;

/// Complexity classification for a task.
///
/// `Forced` is not a complexity level in the ordinary sense: it is the tag
/// applied when `force_model` or `force_agent` is set on the task, which
/// short-circuits the rule/default routing paths entirely (see
/// `relay_router::Router::route`). A `Forced` task's complexity is never
/// compared against a rule's `complexity` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    /// Score below the medium cutoff.
    Simple,
    /// Score at or above the medium cutoff, below the complex cutoff.
    Medium,
    /// Score at or above the complex cutoff.
    Complex,
    /// `force_model` or `force_agent` was set; complexity was not computed.
    Forced,
}

/// Result of analyzing a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskAnalysis {
    /// Complexity classification.
    pub complexity: Complexity,
    /// Estimated context size in tokens.
    pub estimated_tokens: usize,
}

/// Pure, stateless task classifier.
///
/// `analyze` always returns the same result for the same task: it reads
/// nothing but the task itself.
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    /// Estimate the context size of a task in tokens.
    ///
    /// `estimated_tokens = 2000 * file_count + 4 * word_count(description)`.
    /// These constants are part of the observable contract and must not
    /// drift: routing rules and the default table are written against them.
    #[must_use]
    pub fn estimate_tokens(task: &Task) -> usize {
        let file_component = task.context_files.len().saturating_mul(TOKENS_PER_FILE);
        let word_count = task.description.split_whitespace().count();
        let word_component = word_count.saturating_mul(TOKENS_PER_DESCRIPTION_WORD);
        file_component.saturating_add(word_component)
    }

    /// Classify a task's complexity and estimate its context size.
    #[must_use]
    pub fn analyze(task: &Task) -> TaskAnalysis {
        let estimated_tokens = Self::estimate_tokens(task);

        if task.overrides.force_model.is_some() || task.overrides.force_agent.is_some() {
            return TaskAnalysis {
                complexity: Complexity::Forced,
                estimated_tokens,
            };
        }

        let mut score: i32 = 0;

        if matches!(task.task_type, TaskType::Refactor) {
            score += 3;
        }
        if matches!(task.task_type, TaskType::Feature) {
            score += 2;
        }

        let file_count = task.context_files.len();
        if file_count > 5 {
            score += 2;
        } else if file_count > 2 {
            score += 1;
        }

        if estimated_tokens > 100_000 {
            score += 3;
        } else if estimated_tokens > 50_000 {
            score += 2;
        } else if estimated_tokens > 20_000 {
            score += 1;
        }

        if task.skills.len() > 2 {
            score += 1;
        }

        let complexity = if score >= 5 {
            Complexity::Complex
        } else if score >= 3 {
            Complexity::Medium
        } else {
            Complexity::Simple
        };

        TaskAnalysis {
            complexity,
            estimated_tokens,
        }
    }
}
