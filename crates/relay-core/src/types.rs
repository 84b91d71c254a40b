//! Core data model: tasks, providers, routing rules and decisions.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// The closed set of task types the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Implement new functionality.
    Implement,
    /// Restructure existing code without changing behavior.
    Refactor,
    /// Inspect code or output without modifying anything.
    Analyze,
    /// Fix a defect.
    Fix,
    /// Write or run tests.
    Test,
    /// Deliver a user-facing feature.
    Feature,
    /// Fix a reported bug.
    Bugfix,
    /// Write or update documentation.
    Documentation,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Implement => "implement",
            Self::Refactor => "refactor",
            Self::Analyze => "analyze",
            Self::Fix => "fix",
            Self::Test => "test",
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Documentation => "documentation",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "implement" => Ok(Self::Implement),
            "refactor" => Ok(Self::Refactor),
            "analyze" => Ok(Self::Analyze),
            "fix" => Ok(Self::Fix),
            "test" => Ok(Self::Test),
            "feature" => Ok(Self::Feature),
            "bugfix" => Ok(Self::Bugfix),
            "documentation" => Ok(Self::Documentation),
            other => Err(RelayError::InvalidTask(format!(
                "unknown task type: {other}"
            ))),
        }
    }
}

/// The transport method a worker communicates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Agent Communication Protocol: a long-lived streaming stdio session.
    Acp,
    /// A one-shot CLI process invocation.
    Cli,
    /// A direct HTTP API call.
    Api,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Acp => "ACP",
            Self::Cli => "CLI",
            Self::Api => "API",
        };
        f.write_str(s)
    }
}

impl FromStr for Method {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACP" => Ok(Self::Acp),
            "CLI" => Ok(Self::Cli),
            "API" => Ok(Self::Api),
            other => Err(RelayError::InvalidMethod(other.to_string())),
        }
    }
}

/// Caller-supplied overrides that short-circuit normal routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOverrides {
    /// Force routing to this provider by name.
    #[serde(default)]
    pub force_provider: Option<String>,
    /// Force routing to this model. Combined with `force_provider` it is
    /// matched against that provider; alone it is matched against the
    /// whole registry.
    #[serde(default)]
    pub force_model: Option<String>,
    /// Force this transport method regardless of the provider's configured
    /// default.
    #[serde(default)]
    pub force_method: Option<Method>,
    /// Force routing to the hard-coded primary/secondary override agent
    /// pair.
    #[serde(default)]
    pub force_agent: Option<String>,
}

impl TaskOverrides {
    /// True if any override field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.force_provider.is_none()
            && self.force_model.is_none()
            && self.force_method.is_none()
            && self.force_agent.is_none()
    }
}

/// A unit of work to route and execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// What kind of work this is.
    pub task_type: TaskType,
    /// Free-text description of the work, used both for token estimation
    /// and keyword rule matching.
    pub description: String,
    /// Paths the task's context is drawn from.
    #[serde(default)]
    pub context_files: Vec<PathBuf>,
    /// Skills the task is tagged with.
    #[serde(default)]
    pub skills: HashSet<String>,
    /// Caller-supplied routing overrides.
    #[serde(default)]
    pub overrides: TaskOverrides,
}

impl Task {
    /// Construct a task with no context, skills or overrides.
    #[must_use]
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            task_type,
            description: description.into(),
            context_files: Vec::new(),
            skills: HashSet::new(),
            overrides: TaskOverrides::default(),
        }
    }

    /// Set context files.
    #[must_use]
    pub fn with_context_files(mut self, files: Vec<PathBuf>) -> Self {
        self.context_files = files;
        self
    }

    /// Set skills.
    #[must_use]
    pub fn with_skills(mut self, skills: HashSet<String>) -> Self {
        self.skills = skills;
        self
    }

    /// Set overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: TaskOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// A statically configured AI worker provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Unique provider name, used as the routing/registry key.
    pub name: String,
    /// Transport method this provider is invoked over.
    pub method: Method,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Vendor tag, used to look up the cost multiplier. Unrecognized tags
    /// fall back to a 1.0 multiplier rather than erroring (see DESIGN.md).
    pub vendor: String,
    /// Path to an ACP/CLI provider config file, materialized into the
    /// `OPENCODE_CONFIG` environment variable.
    #[serde(default)]
    pub config_path: Option<String>,
    /// Base URL for API-method providers.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API credential.
    #[serde(default)]
    pub api_key_env_var: Option<String>,
    /// Per-provider override of the estimated-cost base, applied in place
    /// of the method/vendor formula when present.
    #[serde(default)]
    pub cost_override: Option<f64>,
}

impl ProviderDefinition {
    /// Construct a minimal provider definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        method: Method,
        model: impl Into<String>,
        vendor: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            method,
            model: model.into(),
            vendor: vendor.into(),
            config_path: None,
            base_url: None,
            api_key_env_var: None,
            cost_override: None,
        }
    }

    /// Set the ACP/CLI config path.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API key environment variable name.
    #[must_use]
    pub fn with_api_key_env_var(mut self, var: impl Into<String>) -> Self {
        self.api_key_env_var = Some(var.into());
        self
    }

    /// Set a cost override.
    #[must_use]
    pub fn with_cost_override(mut self, cost: f64) -> Self {
        self.cost_override = Some(cost);
        self
    }
}

/// The complexity level a routing rule matches against, or the three
/// levels `TaskAnalyzer` can compute plus one it never computes itself
/// (`Trivial`/`High`), which a rule file may still name per §6 validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleComplexity {
    /// Named in rule files for compatibility; `TaskAnalyzer` never emits it.
    Trivial,
    /// Matches `Complexity::Simple`.
    Simple,
    /// Matches `Complexity::Medium`.
    Medium,
    /// Matches `Complexity::Complex`.
    Complex,
    /// Named in rule files for compatibility; `TaskAnalyzer` never emits it.
    High,
}

/// Predicate a `RoutingRule` matches a task against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Exact complexity match, if set.
    #[serde(default)]
    pub complexity: Option<RuleComplexity>,
    /// Task types this rule applies to (case-insensitive). Empty matches
    /// any type.
    #[serde(default)]
    pub types: Vec<TaskType>,
    /// Minimum context file count.
    #[serde(default)]
    pub min_file_count: Option<usize>,
    /// Minimum estimated context size in tokens.
    #[serde(default)]
    pub min_context_tokens: Option<usize>,
    /// Keywords matched case-insensitively as substrings of the task
    /// description. Any match satisfies this predicate.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The routing outcome a rule applies when it matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingAction {
    /// Transport method to route to.
    pub method: Method,
    /// Provider name to route to.
    pub provider: String,
    /// Model to use; defaults to the provider's configured model when
    /// absent.
    #[serde(default)]
    pub model: Option<String>,
}

/// A single routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Unique rule identifier.
    pub id: String,
    /// Higher priority rules are evaluated first. Ties are broken by
    /// input order.
    pub priority: u32,
    /// Predicate this rule matches against.
    #[serde(rename = "match")]
    pub match_: RuleMatch,
    /// Action to take when the predicate matches.
    pub action: RoutingAction,
}

/// Where a `RoutingDecision` came from, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Satisfied a task-supplied override.
    Override,
    /// Satisfied by a `PatternStore` recommendation.
    LearnedPattern,
    /// Satisfied a configured `RoutingRule`.
    Rule,
    /// Fell through to the default routing table.
    Default,
}

/// The outcome of `Router::route`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Transport method selected.
    pub method: Method,
    /// Provider name selected.
    pub provider: String,
    /// Model selected.
    pub model: String,
    /// Estimated cost in dollars at decision time.
    pub estimated_cost: f64,
    /// Human-readable explanation, including override fragments and any
    /// budget fallback note.
    pub reason: String,
    /// Name of the rule, override, learned pattern, or default bucket
    /// that produced this decision.
    pub rule_name: String,
    /// Coarse classification of how the decision was reached.
    pub source: DecisionSource,
}

/// The closed set of worker lifecycle states. Transitions are monotonic:
/// a worker never returns to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Spawned, transport established, no prompt issued yet.
    Ready,
    /// A prompt is in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Cancelled, cooperatively or forcibly.
    Cancelled,
    /// Finished unsuccessfully.
    Failed,
}

impl WorkerStatus {
    /// True for the three states a worker never leaves once entered.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Identity and routing outcome for a spawned worker. The live transport
/// handle and output buffer are owned by `relay-manager`, which depends
/// on this crate rather than the other way around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Unique worker id, allocated at spawn time.
    pub id: String,
    /// Provider this worker was routed to.
    pub provider: String,
    /// Transport method this worker uses.
    pub method: Method,
    /// The task this worker was spawned for.
    pub task: Task,
    /// Current lifecycle status.
    pub status: WorkerStatus,
    /// Wall-clock time the worker was spawned, RFC 3339.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Cost estimated by the router at spawn time. Recorded to the
    /// budget ledger verbatim once the worker reaches a terminal state,
    /// since neither transport surfaces a provider-reported usage cost.
    pub estimated_cost: f64,
    /// Whether a cost has been recorded to the budget ledger for this
    /// worker. Set at most once.
    pub cost_recorded: bool,
}
