// =============================================================================
// Agent Coordinator — turns a scanned, rule-checked candidate into a Decision
// =============================================================================
//
// Pipeline per candidate:
//   1. Failed RuleVerdict            → rejected_by_rule, confidence 0 (final)
//   2. Dedupe signals per (evaluator, stage), weighted mean over evaluators
//   3. Confidence × weight directional vote, ties → neutral
//   4. Optional memory-store delta, combined and clamped to [0, 1]
//   5. confidence ≥ threshold and direction ≠ neutral → approved
//
// Steps 2-5 are a pure function of their inputs (`decide`).  The only I/O is
// the memory-store lookup in `synthesize`, bounded by `MemoryGate`.
// =============================================================================

pub mod consensus;
pub mod decision;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MemoryError;
use crate::memory::{CombineMode, MemoryConfig, MemoryGate, RealizedOutcome};
use crate::rules::RuleVerdict;
use crate::scanner::Candidate;
use crate::types::Direction;

pub use consensus::{dedupe_signals, weighted_consensus, AgentWeights, Consensus, Contribution, DirectionVotes};
pub use decision::{Decision, DecisionOutcome};

/// A memory-store delta ready to be folded into aggregate confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryAdjustment {
    pub delta: f64,
    pub combine: CombineMode,
}

pub struct AgentCoordinator {
    memory: Option<MemoryGate>,
    memory_config: MemoryConfig,
}

impl AgentCoordinator {
    pub fn new(memory: Option<MemoryGate>, memory_config: MemoryConfig) -> Self {
        Self { memory, memory_config }
    }

    /// Coordinator with no memory store attached.
    pub fn without_memory() -> Self {
        Self::new(None, MemoryConfig::default())
    }

    pub async fn synthesize(
        &self,
        candidate: &Candidate,
        verdict: RuleVerdict,
        weights: &AgentWeights,
        consensus_threshold: f64,
    ) -> Decision {
        if !verdict.passed {
            let decision = Decision::rejected_by_rule(candidate, verdict, Utc::now());
            info!(symbol = %decision.symbol, reason = %decision.reason, "decision: rejected_by_rule");
            return decision;
        }

        let adjustment = self.lookup_adjustment(candidate).await;
        let decision = Self::decide(candidate, verdict, weights, consensus_threshold, adjustment, Utc::now());
        info!(
            symbol = %decision.symbol,
            outcome = %decision.outcome,
            direction = %decision.direction,
            confidence = decision.aggregate_confidence,
            raw_confidence = decision.raw_confidence,
            "decision"
        );
        decision
    }

    async fn lookup_adjustment(&self, candidate: &Candidate) -> Option<MemoryAdjustment> {
        if !self.memory_config.adjustment_enabled {
            return None;
        }
        let gate = self.memory.as_ref()?;
        let stats = gate
            .lookup(&candidate.features(), self.memory_config.similarity_threshold)
            .await?;
        let delta = stats.confidence_delta(self.memory_config.adjustment_weight);
        debug!(
            symbol = %candidate.symbol,
            matches = stats.matches,
            win_rate = stats.win_rate,
            delta,
            "memory adjustment"
        );
        Some(MemoryAdjustment { delta, combine: self.memory_config.combine })
    }

    /// Deterministic core of `synthesize`.  `decided_at` is copied into the
    /// decision and plays no part in the arithmetic.
    pub fn decide(
        candidate: &Candidate,
        verdict: RuleVerdict,
        weights: &AgentWeights,
        consensus_threshold: f64,
        adjustment: Option<MemoryAdjustment>,
        decided_at: DateTime<Utc>,
    ) -> Decision {
        if !verdict.passed {
            return Decision::rejected_by_rule(candidate, verdict, decided_at);
        }

        let contributing = dedupe_signals(&candidate.signals);
        let consensus = weighted_consensus(&contributing, weights);

        // With nothing weighted there is no confidence to adjust.
        let applied = adjustment.filter(|_| !consensus.contributions.is_empty());
        let aggregate = match applied {
            Some(adj) => adj.combine.apply(consensus.confidence, adj.delta),
            None => consensus.confidence,
        };

        let approved = aggregate >= consensus_threshold && consensus.direction != Direction::Neutral;
        let (outcome, reason) = if approved {
            (
                DecisionOutcome::Approved,
                format!(
                    "{} consensus {:.3} ≥ {:.2} from {} evaluator(s)",
                    consensus.direction,
                    aggregate,
                    consensus_threshold,
                    consensus.contributions.len()
                ),
            )
        } else if consensus.contributions.is_empty() {
            (DecisionOutcome::RejectedLowConfidence, "no weighted signals".to_string())
        } else if consensus.direction == Direction::Neutral {
            (
                DecisionOutcome::RejectedLowConfidence,
                format!("no directional consensus (confidence {:.3})", aggregate),
            )
        } else {
            (
                DecisionOutcome::RejectedLowConfidence,
                format!("confidence {:.3} below threshold {:.2}", aggregate, consensus_threshold),
            )
        };

        Decision {
            symbol: candidate.symbol.clone(),
            aggregate_confidence: aggregate,
            raw_confidence: consensus.confidence,
            memory_adjustment: applied.map(|a| a.delta),
            direction: consensus.direction,
            contributing,
            verdict,
            scan_score: candidate.score,
            outcome,
            reason,
            features: candidate.features(),
            decided_at,
        }
    }

    /// Feed a resolved decision back to the memory store.  Visible to later
    /// `synthesize` calls only.
    pub async fn record_outcome(&self, decision: &Decision, outcome: RealizedOutcome) -> Result<(), MemoryError> {
        match &self.memory {
            Some(gate) => gate.record(decision, outcome).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for AgentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCoordinator")
            .field("memory", &self.memory)
            .field("memory_config", &self.memory_config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::evaluators::test_support::snapshot_from_closes;
    use crate::memory::test_support::{outcome, FailingStore, FixedStore, HangingStore};
    use crate::memory::{InMemoryStore, MemoryStore};
    use crate::rules::{default_rules, PortfolioContext, RuleEngine};
    use crate::scanner::{FanOutResult, LocalScore, ScanStage};
    use crate::types::{Signal, SignalType};

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_100, 0).unwrap()
    }

    fn candidate(signals: &[(&str, SignalType, Direction, f64)]) -> Candidate {
        let snap = snapshot_from_closes(&[20.0, 20.5], 1e6);
        let stage: ScanStage = serde_json::from_str(r#"{ "name": "confirm", "weight": 1.0 }"#).unwrap();
        let signals = signals
            .iter()
            .map(|(id, t, d, c)| Signal::from_snapshot(id, &snap, *t, *d, *c))
            .collect();
        let mut c = Candidate::new("TEST");
        c.record_stage(
            0,
            &stage,
            LocalScore { score: 1.0, covered: 0, satisfied: 0 },
            FanOutResult { signals, ..FanOutResult::default() },
            snap,
        );
        c
    }

    /// One `record_stage` per entry, in order.
    fn multi_stage_candidate(stages: &[&[(&str, SignalType, Direction, f64)]]) -> Candidate {
        let snap = snapshot_from_closes(&[20.0, 20.5], 1e6);
        let mut c = Candidate::new("TEST");
        for (index, signals) in stages.iter().enumerate() {
            let stage: ScanStage =
                serde_json::from_str(&format!(r#"{{ "name": "stage{index}", "weight": 0.3 }}"#)).unwrap();
            let signals = signals
                .iter()
                .map(|(id, t, d, conf)| Signal::from_snapshot(id, &snap, *t, *d, *conf))
                .collect();
            c.record_stage(
                index,
                &stage,
                LocalScore { score: 1.0, covered: 0, satisfied: 0 },
                FanOutResult { signals, ..FanOutResult::default() },
                snap.clone(),
            );
        }
        c
    }

    fn pass(c: &Candidate) -> RuleVerdict {
        RuleVerdict { symbol: c.symbol.clone(), passed: true, violations: vec![] }
    }

    fn weights(pairs: &[(&str, f64)]) -> AgentWeights {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn two_signal_candidate() -> Candidate {
        candidate(&[
            ("technical", SignalType::EmaCross, Direction::Long, 0.8),
            ("momentum", SignalType::RsiMomentum, Direction::Long, 0.6),
        ])
    }

    fn standard_weights() -> AgentWeights {
        weights(&[("technical", 2.0), ("momentum", 1.0)])
    }

    #[test]
    fn weighted_mean_approves_above_threshold() {
        let c = two_signal_candidate();
        let d = AgentCoordinator::decide(&c, pass(&c), &standard_weights(), 0.70, None, at());
        assert!((d.aggregate_confidence - 2.2 / 3.0).abs() < 1e-9);
        assert_eq!(d.outcome, DecisionOutcome::Approved);
        assert_eq!(d.direction, Direction::Long);
        assert_eq!(d.contributing.len(), 2);
    }

    #[test]
    fn below_threshold_is_rejected() {
        let c = two_signal_candidate();
        let d = AgentCoordinator::decide(&c, pass(&c), &standard_weights(), 0.75, None, at());
        assert_eq!(d.outcome, DecisionOutcome::RejectedLowConfidence);
    }

    #[test]
    fn failed_rules_are_absolute() {
        let c = candidate(&[("technical", SignalType::EmaCross, Direction::Long, 1.0)]);
        let mut ctx = PortfolioContext::flat(10_000.0);
        ctx.daily_pnl = -1_000.0;
        let verdict = RuleEngine::new(default_rules()).unwrap().evaluate(&c, &ctx);
        assert!(!verdict.passed);

        let boost = MemoryAdjustment { delta: 1.0, combine: CombineMode::Additive };
        let d = AgentCoordinator::decide(&c, verdict, &weights(&[("technical", 1.0)]), 0.0, Some(boost), at());
        assert_eq!(d.outcome, DecisionOutcome::RejectedByRule);
        assert_eq!(d.aggregate_confidence, 0.0);
        assert!(d.contributing.is_empty());
        assert!(d.reason.contains("daily_loss"));
    }

    #[test]
    fn identical_inputs_give_identical_decisions() {
        let c = two_signal_candidate();
        let adj = Some(MemoryAdjustment { delta: -0.03, combine: CombineMode::Additive });
        let a = AgentCoordinator::decide(&c, pass(&c), &standard_weights(), 0.70, adj, at());
        let b = AgentCoordinator::decide(&c, pass(&c), &standard_weights(), 0.70, adj, at());
        assert_eq!(a, b);
        assert_eq!(a.aggregate_confidence.to_bits(), b.aggregate_confidence.to_bits());
    }

    #[test]
    fn balanced_votes_are_neutral_and_rejected() {
        let c = candidate(&[
            ("technical", SignalType::EmaCross, Direction::Long, 0.9),
            ("order_flow", SignalType::SpoofDetected, Direction::Short, 0.9),
        ]);
        let w = weights(&[("technical", 1.0), ("order_flow", 1.0)]);
        let d = AgentCoordinator::decide(&c, pass(&c), &w, 0.70, None, at());
        assert_eq!(d.direction, Direction::Neutral);
        assert_eq!(d.outcome, DecisionOutcome::RejectedLowConfidence);
    }

    #[test]
    fn memory_delta_can_push_over_threshold() {
        let c = candidate(&[("technical", SignalType::EmaCross, Direction::Long, 0.65)]);
        let w = weights(&[("technical", 1.0)]);
        let adj = MemoryAdjustment { delta: 0.1, combine: CombineMode::Additive };

        let without = AgentCoordinator::decide(&c, pass(&c), &w, 0.70, None, at());
        let with = AgentCoordinator::decide(&c, pass(&c), &w, 0.70, Some(adj), at());
        assert_eq!(without.outcome, DecisionOutcome::RejectedLowConfidence);
        assert_eq!(with.outcome, DecisionOutcome::Approved);
        assert!((with.aggregate_confidence - 0.75).abs() < 1e-12);
        assert!((with.raw_confidence - 0.65).abs() < 1e-12);
        assert_eq!(with.memory_adjustment, Some(0.1));
    }

    #[test]
    fn memory_delta_ignored_without_weighted_signals() {
        let c = candidate(&[]);
        let adj = MemoryAdjustment { delta: 0.9, combine: CombineMode::Additive };
        let d = AgentCoordinator::decide(&c, pass(&c), &weights(&[("technical", 1.0)]), 0.5, Some(adj), at());
        assert_eq!(d.aggregate_confidence, 0.0);
        assert_eq!(d.memory_adjustment, None);
        assert_eq!(d.outcome, DecisionOutcome::RejectedLowConfidence);
    }

    fn coordinator(store: Arc<dyn MemoryStore>, timeout_ms: u64) -> AgentCoordinator {
        let config = MemoryConfig { timeout_ms, ..MemoryConfig::default() };
        AgentCoordinator::new(Some(MemoryGate::new(store, &config)), config)
    }

    #[tokio::test]
    async fn synthesize_applies_store_history() {
        // Three all-winning matches: delta = 0.10 × (2 × 1 − 1) = +0.10.
        let store = FixedStore(vec![outcome(0.9, 0.02), outcome(0.9, 0.03), outcome(0.85, 0.01)]);
        let coord = coordinator(Arc::new(store), 250);
        let c = candidate(&[("technical", SignalType::EmaCross, Direction::Long, 0.65)]);
        let d = coord
            .synthesize(&c, pass(&c), &weights(&[("technical", 1.0)]), 0.70)
            .await;
        assert_eq!(d.outcome, DecisionOutcome::Approved);
        assert!((d.memory_adjustment.unwrap() - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn store_outage_means_no_adjustment() {
        let c = two_signal_candidate();
        for store in [Arc::new(HangingStore) as Arc<dyn MemoryStore>, Arc::new(FailingStore)] {
            let coord = coordinator(store, 20);
            let started = std::time::Instant::now();
            let d = coord.synthesize(&c, pass(&c), &standard_weights(), 0.70).await;
            assert!(started.elapsed() < std::time::Duration::from_secs(1));
            assert_eq!(d.memory_adjustment, None);
            assert!((d.aggregate_confidence - 2.2 / 3.0).abs() < 1e-9);
            assert_eq!(d.outcome, DecisionOutcome::Approved);
        }
    }

    #[tokio::test]
    async fn recorded_outcomes_affect_later_queries_only() {
        let store = Arc::new(InMemoryStore::new());
        let coord = coordinator(store.clone(), 250);
        let c = candidate(&[("technical", SignalType::EmaCross, Direction::Long, 0.65)]);
        let w = weights(&[("technical", 1.0)]);

        let first = coord.synthesize(&c, pass(&c), &w, 0.70).await;
        assert_eq!(first.memory_adjustment, None);
        for _ in 0..3 {
            coord
                .record_outcome(&first, RealizedOutcome { realized_return: 0.04 })
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 3);

        let second = coord.synthesize(&c, pass(&c), &w, 0.70).await;
        assert!((second.memory_adjustment.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(second.outcome, DecisionOutcome::Approved);
        assert_eq!(first.outcome, DecisionOutcome::RejectedLowConfidence);
    }

    #[test]
    fn evaluator_emitting_two_types_is_weighted_once() {
        let c = candidate(&[
            ("technical", SignalType::EmaCross, Direction::Long, 0.9),
            ("technical", SignalType::VwapBreak, Direction::Long, 0.9),
            ("momentum", SignalType::RsiMomentum, Direction::Long, 0.5),
        ]);
        let w = weights(&[("technical", 1.0), ("momentum", 2.0)]);
        let d = AgentCoordinator::decide(&c, pass(&c), &w, 0.70, None, at());

        // (1 × 0.9 + 2 × 0.5) / 3
        assert!((d.aggregate_confidence - 1.9 / 3.0).abs() < 1e-9);
        assert_eq!(d.outcome, DecisionOutcome::RejectedLowConfidence);
        assert_eq!(d.contributing.len(), 2);
    }

    #[test]
    fn default_cascade_shape_weights_each_evaluator_once() {
        // technical runs on both the momentum and confirmation stages.
        let c = multi_stage_candidate(&[
            &[("volume", SignalType::VolumeSpike, Direction::Long, 0.8)],
            &[
                ("technical", SignalType::EmaCross, Direction::Long, 0.9),
                ("technical", SignalType::VwapBreak, Direction::Long, 0.9),
                ("momentum", SignalType::RsiMomentum, Direction::Long, 0.6),
            ],
            &[
                ("technical", SignalType::EmaCross, Direction::Long, 0.5),
                ("order_flow", SignalType::SpoofDetected, Direction::Short, 0.4),
            ],
        ]);
        let w = crate::config::PipelineConfig::default().weights;
        let d = AgentCoordinator::decide(&c, pass(&c), &w, 0.70, None, at());

        // volume 0.8 × 0.8, technical 1.0 × (0.9 + 0.5) / 2, momentum 0.7 × 0.6,
        // order_flow 0.5 × 0.4, over 0.8 + 1.0 + 0.7 + 0.5
        assert!((d.aggregate_confidence - 1.96 / 3.0).abs() < 1e-9);
        assert_eq!(d.direction, Direction::Long);
        assert_eq!(d.outcome, DecisionOutcome::RejectedLowConfidence);
        assert_eq!(d.contributing.len(), 5);
    }
}
