//! `Router`: the decision engine described in the module doc comment.

use std::sync::Arc;

use relay_budget::BudgetLedger;
use relay_core::{
    Complexity, DecisionSource, Method, PatternStore, ProviderDefinition, ProviderRegistry,
    RelayError, RelayResult, RoutingDecision, RoutingRule, Task, TaskAnalysis, TaskAnalyzer,
};

use crate::cost;
use crate::defaults::DefaultRoutes;

/// Minimum number of recorded patterns before the router trusts a
/// `PatternStore` recommendation.
const MIN_PATTERNS_FOR_LEARNING: usize = 5;

/// The stateless routing decision engine.
///
/// `Router` holds no mutable state of its own beyond what it is handed at
/// construction (an immutable registry, an immutable, priority-sorted
/// rule list, and shared handles to a `BudgetLedger` and an optional
/// `PatternStore`). It is cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct Router {
    registry: ProviderRegistry,
    rules: Vec<RoutingRule>,
    defaults: DefaultRoutes,
    ledger: Arc<BudgetLedger>,
    pattern_store: Option<Arc<dyn PatternStore>>,
    primary_agent: Option<String>,
    secondary_agent: Option<String>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("provider_count", &self.registry.len())
            .field("rule_count", &self.rules.len())
            .field("has_pattern_store", &self.pattern_store.is_some())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Construct a router. Rules are sorted once, by descending priority,
    /// so `route` never re-sorts on the hot path.
    #[must_use]
    pub fn new(
        registry: ProviderRegistry,
        mut rules: Vec<RoutingRule>,
        defaults: DefaultRoutes,
        ledger: Arc<BudgetLedger>,
    ) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            registry,
            rules,
            defaults,
            ledger,
            pattern_store: None,
            primary_agent: None,
            secondary_agent: None,
        }
    }

    /// Attach a `PatternStore`. Until this is called the learning path is
    /// never consulted.
    #[must_use]
    pub fn with_pattern_store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.pattern_store = Some(store);
        self
    }

    /// Configure the provider names `forceAgent` resolves to: the primary
    /// is tried first, the secondary only if the primary is absent from
    /// the registry.
    #[must_use]
    pub fn with_agents(
        mut self,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        self.primary_agent = Some(primary.into());
        self.secondary_agent = Some(secondary.into());
        self
    }

    /// Record the actual cost of a completed worker against the shared
    /// ledger. The router itself never calls this; it is the worker
    /// manager's responsibility once a worker terminates.
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// The provider registry this router was built with, for callers
    /// (the worker manager) that need to resolve a routing decision's
    /// provider name back into its full definition.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Route a task to a provider, method and model.
    #[tracing::instrument(skip(self, task), fields(task_type = %task.task_type))]
    pub async fn route(&self, task: &Task) -> RelayResult<RoutingDecision> {
        let analysis = TaskAnalyzer::analyze(task);

        let decision = if !task.overrides.is_empty() {
            self.route_override(task, &analysis)?
        } else if let Some(decision) = self.route_learned(task, &analysis).await {
            decision
        } else if let Some(decision) = self.route_rules(task, &analysis) {
            decision
        } else {
            self.route_default(task, &analysis)?
        };

        self.apply_budget_fallback(decision, &analysis)
    }

    // ---- override path -------------------------------------------------

    fn route_override(&self, task: &Task, analysis: &TaskAnalysis) -> RelayResult<RoutingDecision> {
        let overrides = &task.overrides;
        let mut fragments = Vec::new();

        let (provider, model) = if let Some(name) = &overrides.force_provider {
            let provider = self
                .registry
                .get(name)
                .ok_or_else(|| RelayError::ProviderNotFound(name.clone()))?;
            fragments.push(format!("force_provider={name}"));

            if let Some(wanted_model) = &overrides.force_model {
                let model = Self::match_model(provider, wanted_model)?;
                fragments.push(format!("force_model={wanted_model}"));
                (provider.clone(), model)
            } else {
                (provider.clone(), provider.model.clone())
            }
        } else if let Some(agent) = &overrides.force_agent {
            let provider = self.resolve_agent(agent, &mut fragments)?;
            (provider.clone(), provider.model.clone())
        } else if let Some(wanted_model) = &overrides.force_model {
            let provider = self.find_provider_by_model(wanted_model)?;
            fragments.push(format!("force_model={wanted_model} (unordered match)"));
            (provider.clone(), provider.model.clone())
        } else {
            return Err(RelayError::InvalidTask(
                "override path entered with no recognized override field set".to_string(),
            ));
        };

        let mut method = provider.method;
        if let Some(forced_method) = overrides.force_method {
            method = forced_method;
            fragments.push(format!("force_method={forced_method}"));
        }

        let estimated_cost = cost::estimate(&provider, method, analysis.estimated_tokens);

        Ok(RoutingDecision {
            method,
            provider: provider.name.clone(),
            model,
            estimated_cost,
            reason: fragments.join(", "),
            rule_name: "override".to_string(),
            source: DecisionSource::Override,
        })
    }

    fn match_model(provider: &ProviderDefinition, wanted: &str) -> RelayResult<String> {
        if provider.model == wanted || provider.model.contains(wanted) {
            Ok(provider.model.clone())
        } else {
            Err(RelayError::InvalidModel {
                provider: provider.name.clone(),
                model: wanted.to_string(),
            })
        }
    }

    fn find_provider_by_model<'a>(&'a self, wanted: &str) -> RelayResult<&'a ProviderDefinition> {
        let mut candidates: Vec<&ProviderDefinition> = self
            .registry
            .iter()
            .filter(|p| p.model == wanted || p.model.contains(wanted))
            .collect();
        // Registry iteration order is not guaranteed; sort lexicographically
        // by provider name so the "first match wins" rule is deterministic
        // (see DESIGN.md's decision on this open question).
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::InvalidModel {
                provider: String::new(),
                model: wanted.to_string(),
            })
    }

    fn resolve_agent<'a>(
        &'a self,
        _agent: &str,
        fragments: &mut Vec<String>,
    ) -> RelayResult<&'a ProviderDefinition> {
        if let Some(primary) = &self.primary_agent {
            if let Some(provider) = self.registry.get(primary) {
                fragments.push(format!("force_agent->primary={primary}"));
                return Ok(provider);
            }
        }
        if let Some(secondary) = &self.secondary_agent {
            if let Some(provider) = self.registry.get(secondary) {
                fragments.push(format!("force_agent->secondary={secondary}"));
                return Ok(provider);
            }
        }
        Err(RelayError::ProviderNotFound(
            "no primary or secondary agent provider configured/registered".to_string(),
        ))
    }

    // ---- learned-pattern path -------------------------------------------

    async fn route_learned(&self, task: &Task, analysis: &TaskAnalysis) -> Option<RoutingDecision> {
        let store = self.pattern_store.as_ref()?;
        if store.total_patterns().await < MIN_PATTERNS_FOR_LEARNING {
            return None;
        }
        let recommendation = store
            .query(task.task_type, task.context_files.len(), analysis.estimated_tokens)
            .await?;
        let provider = self.registry.get(&recommendation.provider)?;

        Some(RoutingDecision {
            method: recommendation.method,
            provider: provider.name.clone(),
            model: recommendation.model.clone(),
            estimated_cost: recommendation.estimated_cost,
            reason: recommendation.reason.clone(),
            rule_name: "learned_pattern".to_string(),
            source: DecisionSource::LearnedPattern,
        })
    }

    // ---- rule path -------------------------------------------------------

    fn route_rules(&self, task: &Task, analysis: &TaskAnalysis) -> Option<RoutingDecision> {
        let rule = self.rules.iter().find(|rule| Self::rule_matches(rule, task, analysis))?;
        let provider = self.registry.get(&rule.action.provider)?;
        let model = rule.action.model.clone().unwrap_or_else(|| provider.model.clone());
        let method = rule.action.method;
        let estimated_cost = cost::estimate(provider, method, analysis.estimated_tokens);

        Some(RoutingDecision {
            method,
            provider: provider.name.clone(),
            model,
            estimated_cost,
            reason: format!("matched rule {}", rule.id),
            rule_name: rule.id.clone(),
            source: DecisionSource::Rule,
        })
    }

    fn rule_matches(rule: &RoutingRule, task: &Task, analysis: &TaskAnalysis) -> bool {
        let m = &rule.match_;

        if let Some(wanted) = m.complexity {
            let matches = match (wanted, analysis.complexity) {
                (relay_core::RuleComplexity::Simple, Complexity::Simple)
                | (relay_core::RuleComplexity::Medium, Complexity::Medium)
                | (relay_core::RuleComplexity::Complex, Complexity::Complex) => true,
                _ => false,
            };
            if !matches {
                return false;
            }
        }

        if !m.types.is_empty() && !m.types.contains(&task.task_type) {
            return false;
        }

        if let Some(min_files) = m.min_file_count {
            if task.context_files.len() < min_files {
                return false;
            }
        }

        if let Some(min_tokens) = m.min_context_tokens {
            if analysis.estimated_tokens < min_tokens {
                return false;
            }
        }

        if !m.keywords.is_empty() {
            let description = task.description.to_ascii_lowercase();
            let any_keyword_matches = m
                .keywords
                .iter()
                .any(|kw| description.contains(&kw.to_ascii_lowercase()));
            if !any_keyword_matches {
                return false;
            }
        }

        true
    }

    // ---- default path ----------------------------------------------------

    fn route_default(&self, task: &Task, analysis: &TaskAnalysis) -> RelayResult<RoutingDecision> {
        let file_count = task.context_files.len();

        let (bucket, bucket_name) = if matches!(analysis.complexity, Complexity::Simple) && file_count <= 1 {
            (&self.defaults.simple_tasks, "simpleTasks")
        } else if analysis.estimated_tokens > 50_000 {
            (&self.defaults.large_context, "largeContext")
        } else if matches!(analysis.complexity, Complexity::Complex) {
            (&self.defaults.complex_tasks, "complexTasks")
        } else {
            (&self.defaults.implementation, "implementation")
        };

        let provider_name = DefaultRoutes::resolve(bucket);
        let provider = self
            .registry
            .get(provider_name)
            .ok_or_else(|| RelayError::ProviderNotFound(provider_name.to_string()))?;
        let estimated_cost = cost::estimate(provider, provider.method, analysis.estimated_tokens);

        Ok(RoutingDecision {
            method: provider.method,
            provider: provider.name.clone(),
            model: provider.model.clone(),
            estimated_cost,
            reason: format!("default routing bucket {bucket_name}"),
            rule_name: "default".to_string(),
            source: DecisionSource::Default,
        })
    }

    // ---- budget fallback ---------------------------------------------------

    fn apply_budget_fallback(
        &self,
        mut decision: RoutingDecision,
        analysis: &TaskAnalysis,
    ) -> RelayResult<RoutingDecision> {
        if !self.ledger.enforcement_active() {
            return Ok(decision);
        }
        if self.ledger.reserve(decision.estimated_cost) {
            return Ok(decision);
        }

        let snapshot = self.ledger.snapshot();
        let remaining = snapshot.remaining;

        let mut candidates: Vec<(&ProviderDefinition, f64)> = self
            .registry
            .iter()
            .filter(|p| p.name != decision.provider)
            .map(|p| (p, cost::estimate(p, p.method, analysis.estimated_tokens)))
            .filter(|(_, candidate_cost)| {
                *candidate_cost < decision.estimated_cost && *candidate_cost <= remaining
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });

        if let Some((cheapest, cheapest_cost)) = candidates.into_iter().next() {
            tracing::warn!(
                original_provider = %decision.provider,
                fallback_provider = %cheapest.name,
                remaining,
                "routing budget fallback triggered"
            );
            decision.reason = format!(
                "{}; budget fallback: {} -> {} ({:.4} -> {:.4})",
                decision.reason, decision.provider, cheapest.name, decision.estimated_cost, cheapest_cost
            );
            decision.provider = cheapest.name.clone();
            decision.model = cheapest.model.clone();
            decision.method = cheapest.method;
            decision.estimated_cost = cheapest_cost;
            Ok(decision)
        } else {
            Err(RelayError::InsufficientBudget {
                provider: decision.provider,
                remaining,
                required: decision.estimated_cost,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Method, ProviderDefinition, RoutingAction, RuleComplexity, RuleMatch, TaskType};

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            ProviderDefinition::new("haiku", Method::Api, "claude-haiku", "anthropic"),
            ProviderDefinition::new("kimi", Method::Acp, "kimi-k2", "moonshot"),
            ProviderDefinition::new("glm", Method::Cli, "glm-4.6", "deepseek"),
            ProviderDefinition::new("opus", Method::Api, "claude-opus", "anthropic"),
        ])
        .unwrap()
    }

    fn router_with(defaults: DefaultRoutes, rules: Vec<RoutingRule>) -> Router {
        Router::new(registry(), rules, defaults, Arc::new(BudgetLedger::new()))
    }

    #[tokio::test]
    async fn simple_task_defaults_to_api_haiku() {
        let defaults = DefaultRoutes {
            simple_tasks: Some("haiku".to_string()),
            ..Default::default()
        };
        let router = router_with(defaults, vec![]);
        let task = Task::new(TaskType::Fix, "fix a small typo");
        let decision = router.route(&task).await.unwrap();
        assert_eq!(decision.provider, "haiku");
        assert_eq!(decision.method, Method::Api);
        assert_eq!(decision.source, DecisionSource::Default);
        assert_eq!(decision.rule_name, "default");
    }

    #[tokio::test]
    async fn large_context_routes_to_acp_kimi() {
        let defaults = DefaultRoutes {
            large_context: Some("kimi".to_string()),
            ..Default::default()
        };
        let router = router_with(defaults, vec![]);
        let files: Vec<_> = (0..30).map(|i| std::path::PathBuf::from(format!("f{i}.rs"))).collect();
        let task = Task::new(TaskType::Analyze, "review the whole module").with_context_files(files);
        let decision = router.route(&task).await.unwrap();
        assert_eq!(decision.provider, "kimi");
        assert_eq!(decision.method, Method::Acp);
        assert_eq!(decision.rule_name, "default");
        assert!(decision.reason.contains("context") || decision.reason.contains("Context"));
    }

    #[tokio::test]
    async fn higher_priority_rule_wins() {
        let rule_a = RoutingRule {
            id: "A".to_string(),
            priority: 100,
            match_: RuleMatch {
                types: vec![TaskType::Fix],
                ..Default::default()
            },
            action: RoutingAction {
                method: Method::Api,
                provider: "haiku".to_string(),
                model: None,
            },
        };
        let rule_b = RoutingRule {
            id: "B".to_string(),
            priority: 1,
            match_: RuleMatch {
                types: vec![TaskType::Fix],
                ..Default::default()
            },
            action: RoutingAction {
                method: Method::Cli,
                provider: "glm".to_string(),
                model: None,
            },
        };
        // Insert lower priority first to prove sorting, not insertion
        // order, decides the winner.
        let router = router_with(DefaultRoutes::default(), vec![rule_b, rule_a]);
        let task = Task::new(TaskType::Fix, "fix it");
        let decision = router.route(&task).await.unwrap();
        assert_eq!(decision.rule_name, "A");
        assert_eq!(decision.provider, "haiku");
    }

    #[tokio::test]
    async fn budget_fallback_switches_to_cheaper_provider() {
        let defaults = DefaultRoutes {
            simple_tasks: Some("opus".to_string()),
            ..Default::default()
        };
        let ledger = Arc::new(BudgetLedger::new());
        ledger.set_budget(0.015);
        let router = Router::new(registry(), vec![], defaults, ledger);
        let task = Task::new(TaskType::Fix, "small fix");
        let decision = router.route(&task).await.unwrap();
        // opus (anthropic, API) costs 0.01 * 1.0 * 2.0 = 0.02, over budget;
        // glm (deepseek, CLI) costs 0.01 * 0.5 * 0.5 = 0.0025, fits.
        assert_eq!(decision.provider, "glm");
        assert!(decision.reason.contains("budget fallback"));
    }

    #[tokio::test]
    async fn override_takes_precedence_over_rules() {
        let rule = RoutingRule {
            id: "always-glm".to_string(),
            priority: 1,
            match_: RuleMatch::default(),
            action: RoutingAction {
                method: Method::Cli,
                provider: "glm".to_string(),
                model: None,
            },
        };
        let router = router_with(DefaultRoutes::default(), vec![rule]);
        let mut task = Task::new(TaskType::Fix, "fix it");
        task.overrides.force_provider = Some("haiku".to_string());
        let decision = router.route(&task).await.unwrap();
        assert_eq!(decision.provider, "haiku");
        assert_eq!(decision.source, DecisionSource::Override);
        assert_eq!(decision.rule_name, "override");
    }

    #[tokio::test]
    async fn invalid_override_model_is_rejected() {
        let router = router_with(DefaultRoutes::default(), vec![]);
        let mut task = Task::new(TaskType::Fix, "fix it");
        task.overrides.force_provider = Some("haiku".to_string());
        task.overrides.force_model = Some("does-not-exist".to_string());
        let err = router.route(&task).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidModel { .. }));
    }

    #[tokio::test]
    async fn force_provider_and_model_substring_match_resolves_to_the_canonical_model() {
        // "opus" provider's model is "claude-opus"; forceModel="opus" is a
        // substring match, and the decision must carry the provider's
        // actual model id, not the override string verbatim.
        let router = router_with(DefaultRoutes::default(), vec![]);
        let mut task = Task::new(TaskType::Fix, "fix it");
        task.overrides.force_provider = Some("opus".to_string());
        task.overrides.force_model = Some("opus".to_string());
        let decision = router.route(&task).await.unwrap();
        assert_eq!(decision.provider, "opus");
        assert_eq!(decision.model, "claude-opus");
    }

    #[test]
    fn rule_priority_ordering_never_skips_to_later_rule() {
        let rules = vec![
            RoutingRule {
                id: "low".to_string(),
                priority: 1,
                match_: RuleMatch::default(),
                action: RoutingAction { method: Method::Cli, provider: "glm".to_string(), model: None },
            },
            RoutingRule {
                id: "high".to_string(),
                priority: 50,
                match_: RuleMatch::default(),
                action: RoutingAction { method: Method::Api, provider: "haiku".to_string(), model: None },
            },
        ];
        let router = router_with(DefaultRoutes::default(), rules);
        assert_eq!(router.rules[0].id, "high");
        assert_eq!(router.rules[1].id, "low");
    }
}
