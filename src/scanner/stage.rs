// =============================================================================
// Scan stages — ordered, statically configured filters
// =============================================================================
//
// A stage names the timeframe it needs, the evaluators that run on it, the
// signal checks that make up its local score, and hard criteria.  Criteria
// are all-or-nothing: failing any one of them drops the symbol.
// =============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{MarketSnapshot, Signal, SignalType, Timeframe};

fn default_stage_timeout_ms() -> u64 {
    2_000
}

/// Hard gates applied to a symbol after its evaluators ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCriteria {
    #[serde(default)]
    pub min_volume: Option<f64>,
    /// Minimum volume / float.
    #[serde(default)]
    pub min_rotation: Option<f64>,
    /// Minimum percent change versus previous close.
    #[serde(default)]
    pub min_up_percent: Option<f64>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Checks that must be satisfied on this stage.
    #[serde(default)]
    pub required_signals: Vec<SignalType>,
    #[serde(default)]
    pub min_local_score: Option<f64>,
    /// Signals below this confidence do not satisfy a check.
    #[serde(default)]
    pub min_signal_confidence: f64,
}

impl StageCriteria {
    /// Every criterion the symbol fails, as human-readable reasons.
    /// Empty means the symbol passes.
    pub fn failures(&self, snapshot: &MarketSnapshot, signals: &[Signal], local_score: f64) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(min) = self.min_volume {
            if !(snapshot.volume >= min) {
                out.push(format!("volume {:.0} < min {:.0}", snapshot.volume, min));
            }
        }

        if let Some(min) = self.min_rotation {
            match snapshot.rotation() {
                Some(r) if r >= min => {}
                Some(r) => out.push(format!("rotation {:.3} < min {:.3}", r, min)),
                None => out.push("rotation unknown (no float)".to_string()),
            }
        }

        if let Some(min) = self.min_up_percent {
            match snapshot.up_percent() {
                Some(p) if p >= min => {}
                Some(p) => out.push(format!("up {:.2}% < min {:.2}%", p, min)),
                None => out.push("up percent unknown".to_string()),
            }
        }

        if let Some(min) = self.min_price {
            if !(snapshot.close >= min) {
                out.push(format!("price {:.4} < min {:.4}", snapshot.close, min));
            }
        }
        if let Some(max) = self.max_price {
            if !(snapshot.close <= max) {
                out.push(format!("price {:.4} > max {:.4}", snapshot.close, max));
            }
        }

        for required in &self.required_signals {
            if !self.is_satisfied(*required, signals) {
                out.push(format!("required signal {} missing", required));
            }
        }

        if let Some(min) = self.min_local_score {
            if local_score < min {
                out.push(format!("stage score {:.3} < min {:.3}", local_score, min));
            }
        }

        out
    }

    /// A check is satisfied by any signal of that type at or above
    /// `min_signal_confidence`.
    pub fn is_satisfied(&self, check: SignalType, signals: &[Signal]) -> bool {
        signals
            .iter()
            .any(|s| s.signal_type == check && s.confidence >= self.min_signal_confidence)
    }
}

/// One step of the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStage {
    pub name: String,
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Contribution of this stage's local score to the running score.
    #[serde(default)]
    pub weight: f64,
    /// Per-symbol wall-clock budget for snapshot fetch plus evaluators.
    #[serde(default = "default_stage_timeout_ms")]
    pub timeout_ms: u64,
    /// Evaluator ids that run on this stage.
    #[serde(default)]
    pub evaluators: Vec<String>,
    /// Signal types that make up the stage-local score.
    #[serde(default)]
    pub checks: Vec<SignalType>,
    #[serde(default)]
    pub criteria: StageCriteria,
}

/// Breakdown of a stage-local score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalScore {
    pub score: f64,
    /// Checks whose evaluator completed in time.
    pub covered: usize,
    pub satisfied: usize,
}

impl ScanStage {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Fraction of this stage's checks satisfied, counted only over checks
    /// whose producing evaluator completed (`covered`).
    ///
    /// A stage with no checks scores 1.0; a stage whose checks were all
    /// left uncovered scores 0.0.
    pub fn local_score(&self, covered: &BTreeSet<SignalType>, signals: &[Signal]) -> LocalScore {
        if self.checks.is_empty() {
            return LocalScore { score: 1.0, covered: 0, satisfied: 0 };
        }
        let mut n_covered = 0;
        let mut n_satisfied = 0;
        for check in &self.checks {
            if !covered.contains(check) {
                continue;
            }
            n_covered += 1;
            if self.criteria.is_satisfied(*check, signals) {
                n_satisfied += 1;
            }
        }
        let score = if n_covered == 0 {
            0.0
        } else {
            n_satisfied as f64 / n_covered as f64
        };
        LocalScore { score, covered: n_covered, satisfied: n_satisfied }
    }
}
