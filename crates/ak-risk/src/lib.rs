// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adaptive risk tracking (design §4.10): per-tool EMA error rate drives a
//! three-rung risk ladder, and a separate EMA over (provider, model) pairs
//! reorders fallback candidates by observed success.

#![deny(unsafe_code)]

use std::collections::{HashMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const ERROR_EMA_ALPHA: f64 = 0.1;
const MODEL_EMA_ALPHA: f64 = 0.15;
const MIN_SAMPLES_FOR_ADJUSTMENT: u32 = 5;
const ESCALATE_THRESHOLD: f64 = 0.40;
const DEESCALATE_THRESHOLD: f64 = 0.10;

/// A tool's three-rung risk ladder position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::High => RiskLevel::High,
        }
    }

    fn deescalate(self) -> Self {
        match self {
            RiskLevel::High => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::Low => RiskLevel::Low,
        }
    }
}

/// Per-tool EMA error-rate statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskStats {
    pub ema_error_rate: f64,
    pub samples: u32,
}

impl RiskStats {
    fn record(&mut self, failed: bool) {
        let outcome = if failed { 1.0 } else { 0.0 };
        self.ema_error_rate = if self.samples == 0 {
            outcome
        } else {
            ERROR_EMA_ALPHA * outcome + (1.0 - ERROR_EMA_ALPHA) * self.ema_error_rate
        };
        self.samples += 1;
    }
}

/// Tracks per-tool risk escalation driven by observed error rate.
pub struct AdaptiveRiskTracker {
    stats: HashMap<String, RiskStats>,
    levels: HashMap<String, RiskLevel>,
    intrinsic_risk_tools: HashSet<String>,
}

impl AdaptiveRiskTracker {
    pub fn new(intrinsic_risk_tools: HashSet<String>) -> Self {
        Self { stats: HashMap::new(), levels: HashMap::new(), intrinsic_risk_tools }
    }

    /// Record a tool invocation outcome, updating its EMA and, once at
    /// least five samples have accumulated, its risk rung.
    pub fn record_outcome(&mut self, tool: &str, base_risk: RiskLevel, failed: bool) {
        let stats = self.stats.entry(tool.to_string()).or_default();
        stats.record(failed);

        let current = *self.levels.get(tool).unwrap_or(&base_risk);
        let next = if stats.samples < MIN_SAMPLES_FOR_ADJUSTMENT {
            current
        } else if stats.ema_error_rate >= ESCALATE_THRESHOLD {
            current.escalate()
        } else if stats.ema_error_rate <= DEESCALATE_THRESHOLD {
            let deescalated = current.deescalate();
            if self.intrinsic_risk_tools.contains(tool) && deescalated < RiskLevel::Medium {
                RiskLevel::Medium
            } else {
                deescalated
            }
        } else {
            current
        };
        self.levels.insert(tool.to_string(), next);
    }

    /// The effective risk level for `tool`, given its declared base risk.
    pub fn resolve(&self, tool: &str, base_risk: RiskLevel) -> RiskLevel {
        *self.levels.get(tool).unwrap_or(&base_risk)
    }

    pub fn stats_for(&self, tool: &str) -> RiskStats {
        self.stats.get(tool).copied().unwrap_or_default()
    }
}

/// Per-(provider, model) EMA success rate, used to reorder fallback
/// candidates without needing a fresh evaluation pass.
#[derive(Default)]
pub struct ModelSuccessTracker {
    success_ema: HashMap<(String, String), f64>,
    samples: HashMap<(String, String), u32>,
}

impl ModelSuccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, provider: &str, model: &str, succeeded: bool) {
        let key = (provider.to_string(), model.to_string());
        let outcome = if succeeded { 1.0 } else { 0.0 };
        let samples = self.samples.entry(key.clone()).or_insert(0);
        let ema = self.success_ema.entry(key).or_insert(outcome);
        *ema = if *samples == 0 { outcome } else { MODEL_EMA_ALPHA * outcome + (1.0 - MODEL_EMA_ALPHA) * *ema };
        *samples += 1;
    }

    fn success_rate(&self, provider: &str, model: &str) -> Option<f64> {
        self.success_ema.get(&(provider.to_string(), model.to_string())).copied()
    }

    /// Reorder `candidates` (provider, model) pairs by observed success
    /// rate, descending; pairs with no observations sort after all observed
    /// ones; ties (including all-unobserved) preserve config order.
    pub fn reorder<'a>(&self, candidates: &'a [(String, String)]) -> Vec<&'a (String, String)> {
        let mut indexed: Vec<(usize, &(String, String))> = candidates.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            let ra = self.success_rate(&a.0, &a.1);
            let rb = self.success_rate(&b.0, &b.1);
            match (ra, rb) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal).then(ia.cmp(ib)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => ia.cmp(ib),
            }
        });
        indexed.into_iter().map(|(_, c)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_after_five_samples_with_high_error_rate() {
        let mut tracker = AdaptiveRiskTracker::new(HashSet::new());
        for _ in 0..5 {
            tracker.record_outcome("read_file", RiskLevel::Low, true);
        }
        assert_eq!(tracker.resolve("read_file", RiskLevel::Low), RiskLevel::Medium);
    }

    #[test]
    fn stays_put_before_five_samples() {
        let mut tracker = AdaptiveRiskTracker::new(HashSet::new());
        for _ in 0..4 {
            tracker.record_outcome("read_file", RiskLevel::Low, true);
        }
        assert_eq!(tracker.resolve("read_file", RiskLevel::Low), RiskLevel::Low);
    }

    #[test]
    fn deescalates_after_five_clean_samples() {
        let mut tracker = AdaptiveRiskTracker::new(HashSet::new());
        for _ in 0..5 {
            tracker.record_outcome("read_file", RiskLevel::High, false);
        }
        assert_eq!(tracker.resolve("read_file", RiskLevel::High), RiskLevel::Medium);
    }

    #[test]
    fn intrinsic_risk_tools_never_drop_below_medium() {
        let mut intrinsic = HashSet::new();
        intrinsic.insert("exec_shell".to_string());
        let mut tracker = AdaptiveRiskTracker::new(intrinsic);
        for _ in 0..20 {
            tracker.record_outcome("exec_shell", RiskLevel::High, false);
        }
        assert_eq!(tracker.resolve("exec_shell", RiskLevel::High), RiskLevel::Medium);
    }

    #[test]
    fn first_sample_initializes_ema_directly() {
        let mut tracker = AdaptiveRiskTracker::new(HashSet::new());
        tracker.record_outcome("t", RiskLevel::Low, true);
        assert_eq!(tracker.stats_for("t").ema_error_rate, 1.0);
    }

    #[test]
    fn model_tracker_reorders_by_success_rate() {
        let mut tracker = ModelSuccessTracker::new();
        tracker.record("openai", "gpt", false);
        tracker.record("anthropic", "claude", true);
        let candidates = vec![("openai".to_string(), "gpt".to_string()), ("anthropic".to_string(), "claude".to_string())];
        let ordered = tracker.reorder(&candidates);
        assert_eq!(ordered[0], &candidates[1]);
    }

    #[test]
    fn model_tracker_keeps_config_order_for_unobserved_pairs() {
        let tracker = ModelSuccessTracker::new();
        let candidates = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())];
        let ordered = tracker.reorder(&candidates);
        assert_eq!(ordered, vec![&candidates[0], &candidates[1]]);
    }
}
