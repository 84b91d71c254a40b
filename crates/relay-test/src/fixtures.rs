//! Fixture builders for a representative provider registry and rule set.

use relay_core::{Method, ProviderDefinition, ProviderRegistry, RoutingAction, RoutingRule, RuleMatch};

/// A small registry covering all three transport methods and all four
/// vendor cost tiers used in the routing tests and examples.
#[must_use]
pub fn sample_registry() -> ProviderRegistry {
    ProviderRegistry::new(vec![
        ProviderDefinition::new("haiku", Method::Api, "claude-haiku-4.5", "anthropic"),
        ProviderDefinition::new("opus", Method::Api, "claude-opus-4.5", "anthropic"),
        ProviderDefinition::new("kimi", Method::Acp, "kimi-k2", "moonshot"),
        ProviderDefinition::new("glm", Method::Cli, "glm-4.6", "deepseek"),
    ])
    .expect("fixture registry has unique provider names")
}

/// A rule set with one high-priority rule and one low-priority rule that
/// would both match the same task, used for priority-ordering tests.
#[must_use]
pub fn sample_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule {
            id: "security-keywords".to_string(),
            priority: 100,
            match_: RuleMatch {
                keywords: vec!["security".to_string(), "auth".to_string()],
                ..Default::default()
            },
            action: RoutingAction {
                method: Method::Api,
                provider: "opus".to_string(),
                model: None,
            },
        },
        RoutingRule {
            id: "catch-all-fix".to_string(),
            priority: 1,
            match_: RuleMatch::default(),
            action: RoutingAction {
                method: Method::Cli,
                provider: "glm".to_string(),
                model: None,
            },
        },
    ]
}
