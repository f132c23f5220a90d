//! Compiled search strategy and the feedback-driven parameter weights
//! carried into the next compilation.

use std::collections::BTreeMap;

use serde::Serialize;

/// Weights are kept within `[-WEIGHT_BOUND, WEIGHT_BOUND]`.
pub const WEIGHT_BOUND: f64 = 100.0;

/// Ranked queries proposed by the strategy compiler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyPlan {
    /// Opaque project identity returned by the compiler.
    pub identity: serde_json::Value,
    pub queries: Vec<String>,
    /// The plan did not come from a successful compilation.
    pub degraded: bool,
    pub warning: Option<String>,
}

impl StrategyPlan {
    pub fn compiled(identity: serde_json::Value, queries: Vec<String>) -> Self {
        Self {
            identity,
            queries,
            degraded: false,
            warning: None,
        }
    }

    /// Default plan used when the compiler is unavailable.
    pub fn fallback(queries: Vec<String>, warning: impl Into<String>) -> Self {
        Self {
            identity: serde_json::Value::Null,
            queries,
            degraded: true,
            warning: Some(warning.into()),
        }
    }
}

/// Accumulated parameter weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    weights: BTreeMap<String, f64>,
}

impl ParameterSet {
    /// Add each delta to its weight, clamping the result.
    pub fn apply(&mut self, deltas: &BTreeMap<String, f64>) {
        for (name, delta) in deltas {
            if !delta.is_finite() {
                continue;
            }
            let weight = self.weights.entry(name.clone()).or_insert(0.0);
            *weight = (*weight + delta).clamp(-WEIGHT_BOUND, WEIGHT_BOUND);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_accumulate_and_clamp() {
        let mut params = ParameterSet::default();
        let deltas = BTreeMap::from([("legal".to_string(), -60.0), ("saas".to_string(), 10.0)]);
        params.apply(&deltas);
        params.apply(&deltas);
        assert_eq!(params.get("legal"), Some(-100.0));
        assert_eq!(params.get("saas"), Some(20.0));
        assert_eq!(params.get("fintech"), None);
    }

    #[test]
    fn non_finite_deltas_are_ignored() {
        let mut params = ParameterSet::default();
        params.apply(&BTreeMap::from([("x".to_string(), f64::NAN)]));
        assert!(params.is_empty());
    }

    #[test]
    fn fallback_plan_is_degraded() {
        let plan = StrategyPlan::fallback(vec!["q".into()], "compiler down");
        assert!(plan.degraded);
        assert_eq!(plan.warning.as_deref(), Some("compiler down"));
        assert!(!StrategyPlan::compiled(serde_json::Value::Null, vec![]).degraded);
    }
}
