// =============================================================================
// Decision — terminal, auditable output of the pipeline
// =============================================================================
//
// A decision records the verdict from every layer (rules, consensus, memory)
// so that it can be audited after the fact.  It is written once and never
// mutated.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::CandidateFeatures;
use crate::rules::RuleVerdict;
use crate::scanner::Candidate;
use crate::types::{Direction, StagedSignal, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    RejectedByRule,
    RejectedLowConfidence,
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::RejectedByRule => write!(f, "rejected_by_rule"),
            Self::RejectedLowConfidence => write!(f, "rejected_low_confidence"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: Symbol,

    /// Final confidence in [0, 1], after the memory adjustment.
    pub aggregate_confidence: f64,

    /// Weighted-mean confidence before the memory adjustment.
    pub raw_confidence: f64,

    /// Delta supplied by the memory store, when one was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_adjustment: Option<f64>,

    pub direction: Direction,

    /// Deduplicated signals that fed the consensus.
    pub contributing: Vec<StagedSignal>,

    pub verdict: RuleVerdict,

    /// Running scan score carried from the scanner (informational).
    pub scan_score: f64,

    pub outcome: DecisionOutcome,

    /// Human-readable explanation.
    pub reason: String,

    /// Features the memory store was queried with; recorded on resolution.
    pub features: CandidateFeatures,

    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Terminal rejection by the rule engine. Consensus and memory are skipped.
    pub fn rejected_by_rule(candidate: &Candidate, verdict: RuleVerdict, decided_at: DateTime<Utc>) -> Self {
        Self {
            symbol: candidate.symbol.clone(),
            aggregate_confidence: 0.0,
            raw_confidence: 0.0,
            memory_adjustment: None,
            direction: Direction::Neutral,
            contributing: Vec::new(),
            reason: format!("rejected by rules: {}", verdict.summary()),
            verdict,
            scan_score: candidate.score,
            outcome: DecisionOutcome::RejectedByRule,
            features: candidate.features(),
            decided_at,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.outcome == DecisionOutcome::Approved
    }
}
