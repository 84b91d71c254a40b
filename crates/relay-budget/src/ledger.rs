//! `BudgetLedger`: a mutex-serialized process-wide cost ledger.

use std::collections::HashMap;
use std::sync::Mutex;

/// A point-in-time copy of the ledger's state.
#[derive(Debug, Clone)]
pub struct BudgetSnapshot {
    /// Budget remaining. Meaningless (always equal to `total_budget`) when
    /// enforcement is disabled.
    pub remaining: f64,
    /// Total recorded cost per provider.
    pub per_provider: HashMap<String, f64>,
}

struct LedgerState {
    total_budget: f64,
    per_provider: HashMap<String, f64>,
}

impl LedgerState {
    fn recorded_total(&self) -> f64 {
        self.per_provider.values().sum()
    }

    fn remaining(&self) -> f64 {
        self.total_budget - self.recorded_total()
    }

    fn enforcement_active(&self) -> bool {
        self.total_budget > 0.0
    }
}

/// Tracks cumulative spend against an optional process-wide budget.
///
/// All operations are serialized by a single mutex; the critical section
/// is pure arithmetic and never held across an `.await` point, so a
/// blocking `std::sync::Mutex` is the right tool here rather than an
/// async one.
///
/// A `total_budget` of zero or less disables enforcement entirely:
/// `reserve` always returns `true` and the router never attempts a
/// budget fallback. `record` always succeeds and can drive `remaining`
/// negative when a worker's actual cost exceeds what was reserved for
/// it; this is allowed by design (see DESIGN.md) and must be surfaced by
/// whatever metrics layer wraps this ledger, not rejected here.
pub struct BudgetLedger {
    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for BudgetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("BudgetLedger")
            .field("total_budget", &state.total_budget)
            .field("remaining", &state.remaining())
            .field("provider_count", &state.per_provider.len())
            .finish()
    }
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetLedger {
    /// Construct a ledger with enforcement disabled (`total_budget == 0`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                total_budget: 0.0,
                per_provider: HashMap::new(),
            }),
        }
    }

    /// Set (or replace) the total budget, resetting `remaining` to it and
    /// clearing all recorded per-provider spend.
    pub fn set_budget(&self, total: f64) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.total_budget = total;
        state.per_provider.clear();
    }

    /// Check, without mutating, whether `estimated_cost` fits the
    /// remaining budget. Always `true` when enforcement is disabled.
    #[must_use]
    pub fn reserve(&self, estimated_cost: f64) -> bool {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.enforcement_active() {
            return true;
        }
        estimated_cost <= state.remaining()
    }

    /// Record an actual cost against a provider. Always succeeds; may
    /// drive `remaining` negative.
    pub fn record(&self, provider: &str, cost: f64) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state.per_provider.entry(provider.to_string()).or_insert(0.0) += cost;
        tracing::debug!(provider, cost, remaining = state.remaining(), "recorded worker cost");
    }

    /// Clear all recorded spend. Does not change `total_budget`.
    pub fn reset(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.per_provider.clear();
    }

    /// True if a positive total budget is configured, i.e. enforcement is
    /// active and `reserve`/the router's budget-fallback path are
    /// meaningful.
    #[must_use]
    pub fn enforcement_active(&self) -> bool {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.enforcement_active()
    }

    /// Snapshot the ledger's current state.
    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        BudgetSnapshot {
            remaining: state.remaining(),
            per_provider: state.per_provider.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_disables_enforcement() {
        let ledger = BudgetLedger::new();
        assert!(!ledger.enforcement_active());
        assert!(ledger.reserve(1_000_000.0));
    }

    #[test]
    fn reserve_respects_remaining() {
        let ledger = BudgetLedger::new();
        ledger.set_budget(0.10);
        assert!(ledger.reserve(0.05));
        assert!(!ledger.reserve(0.20));
    }

    #[test]
    fn record_can_drive_remaining_negative() {
        let ledger = BudgetLedger::new();
        ledger.set_budget(0.01);
        ledger.record("haiku", 0.05);
        let snapshot = ledger.snapshot();
        assert!(snapshot.remaining < 0.0);
    }

    #[test]
    fn exact_cost_recording_scenario() {
        // SetBudget 0.10, Record glm 0.02, Record haiku 0.03 -> remaining 0.05.
        let ledger = BudgetLedger::new();
        ledger.set_budget(0.10);
        ledger.record("glm", 0.02);
        ledger.record("haiku", 0.03);
        let snapshot = ledger.snapshot();
        assert!((snapshot.remaining - 0.05).abs() < 1e-9);
        assert!((snapshot.per_provider["glm"] - 0.02).abs() < 1e-9);
        assert!((snapshot.per_provider["haiku"] - 0.03).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_spend_but_not_budget() {
        let ledger = BudgetLedger::new();
        ledger.set_budget(1.0);
        ledger.record("haiku", 0.5);
        ledger.reset();
        let snapshot = ledger.snapshot();
        assert!((snapshot.remaining - 1.0).abs() < 1e-9);
        assert!(snapshot.per_provider.is_empty());
    }

    #[test]
    fn record_accumulates_per_provider() {
        let ledger = BudgetLedger::new();
        ledger.record("haiku", 0.01);
        ledger.record("haiku", 0.02);
        let snapshot = ledger.snapshot();
        assert!((snapshot.per_provider["haiku"] - 0.03).abs() < 1e-9);
    }

    #[test]
    fn set_budget_clears_stale_spend_from_before_the_rebudget() {
        let ledger = BudgetLedger::new();
        ledger.set_budget(1.0);
        ledger.record("x", 0.5);
        ledger.set_budget(2.0);
        let snapshot = ledger.snapshot();
        assert!(snapshot.per_provider.is_empty());
        assert!((snapshot.remaining - 2.0).abs() < 1e-9);
    }
}
