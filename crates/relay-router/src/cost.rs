//! Cost estimation formula.
//!
//! `estimated_cost = base(tokens) * method_multiplier * vendor_multiplier`,
//! unless the provider carries a `cost_override`, in which case that value
//! is used directly. These constants are part of the router's observable
//! contract (see the literal scenarios in the design doc's testable
//! properties section) and must not drift.

use relay_core::{Method, ProviderDefinition};

/// Base cost before method/vendor multipliers, selected by estimated
/// context size.
#[must_use]
pub fn base_cost(estimated_tokens: usize) -> f64 {
    if estimated_tokens > 100_000 {
        0.05
    } else if estimated_tokens > 50_000 {
        0.03
    } else if estimated_tokens > 20_000 {
        0.02
    } else {
        0.01
    }
}

/// Per-method cost multiplier.
#[must_use]
pub fn method_multiplier(method: Method) -> f64 {
    match method {
        Method::Acp => 1.5,
        Method::Api => 1.0,
        Method::Cli => 0.5,
    }
}

/// Per-vendor cost multiplier.
///
/// An unrecognized vendor tag falls back to 1.0 rather than erroring: see
/// DESIGN.md's decision on the open question of unknown vendor handling.
#[must_use]
pub fn vendor_multiplier(vendor: &str) -> f64 {
    match vendor {
        "anthropic" => 2.0,
        "moonshot" => 1.0,
        "deepseek" => 0.5,
        _ => 1.0,
    }
}

/// Estimate the cost of routing `estimated_tokens` worth of context to
/// `provider` over `method`.
#[must_use]
pub fn estimate(provider: &ProviderDefinition, method: Method, estimated_tokens: usize) -> f64 {
    if let Some(overridden) = provider.cost_override {
        return overridden;
    }
    base_cost(estimated_tokens) * method_multiplier(method) * vendor_multiplier(&provider.vendor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_cost_thresholds() {
        assert!((base_cost(100) - 0.01).abs() < 1e-9);
        assert!((base_cost(20_001) - 0.02).abs() < 1e-9);
        assert!((base_cost(50_001) - 0.03).abs() < 1e-9);
        assert!((base_cost(100_001) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn unknown_vendor_defaults_to_one() {
        assert!((vendor_multiplier("unknown-vendor") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cost_override_bypasses_formula() {
        let provider = ProviderDefinition::new("p", Method::Acp, "m", "anthropic")
            .with_cost_override(0.001);
        assert!((estimate(&provider, Method::Acp, 1_000_000) - 0.001).abs() < 1e-9);
    }
}
