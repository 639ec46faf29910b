// =============================================================================
// Candidate — a symbol progressing through the cascade
// =============================================================================

use serde::{Deserialize, Serialize};

use super::fanout::FanOutResult;
use super::stage::{LocalScore, ScanStage};
use crate::memory::CandidateFeatures;
use crate::types::{Direction, MarketSnapshot, SignalType, StagedSignal, Symbol};

/// Per-stage scoring record kept on the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageScore {
    pub stage_index: usize,
    pub stage_name: String,
    pub weight: f64,
    pub local: LocalScore,
    /// Evaluators that did not finish before the stage deadline.
    pub timed_out: Vec<String>,
    /// Evaluators that returned an error.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: Symbol,
    /// Every signal from every stage survived, in stage order.
    pub signals: Vec<StagedSignal>,
    pub stage_scores: Vec<StageScore>,
    /// Σ(stage_weight × stage_local_score) over completed stages.
    pub score: f64,
    /// Snapshot from the most recent stage this candidate passed.
    pub last_snapshot: Option<MarketSnapshot>,
    /// True once the candidate survived every stage and the memory filter.
    pub finalized: bool,
}

impl Candidate {
    pub fn new(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            signals: Vec::new(),
            stage_scores: Vec::new(),
            score: 0.0,
            last_snapshot: None,
            finalized: false,
        }
    }

    /// Fold a passed stage into the candidate.
    pub(crate) fn record_stage(
        &mut self,
        stage_index: usize,
        stage: &ScanStage,
        local: LocalScore,
        fanout: FanOutResult,
        snapshot: MarketSnapshot,
    ) {
        let FanOutResult { signals, timed_out, failed, .. } = fanout;
        self.signals.extend(signals.into_iter().map(|signal| StagedSignal {
            stage_index,
            stage_name: stage.name.clone(),
            signal,
        }));
        self.score += stage.weight * local.score;
        self.stage_scores.push(StageScore {
            stage_index,
            stage_name: stage.name.clone(),
            weight: stage.weight,
            local,
            timed_out,
            failed,
        });
        self.last_snapshot = Some(snapshot);
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_snapshot.as_ref().map(|s| s.close)
    }

    pub fn last_volume(&self) -> Option<f64> {
        self.last_snapshot.as_ref().map(|s| s.volume)
    }

    /// Feature vector used for memory-store similarity:
    /// `[score, rotation, up_percent / 100, <one column per SignalType>]`
    /// where each signal column is the strongest confidence of that type,
    /// signed by direction (long +, short −).
    pub fn features(&self) -> CandidateFeatures {
        let snapshot = self.last_snapshot.as_ref();
        let mut vector = vec![
            self.score,
            snapshot.and_then(MarketSnapshot::rotation).unwrap_or(0.0),
            snapshot.and_then(MarketSnapshot::up_percent).unwrap_or(0.0) / 100.0,
        ];
        for t in SignalType::ALL {
            let strongest = self
                .signals
                .iter()
                .filter(|s| s.signal.signal_type == t)
                .map(|s| match s.signal.direction {
                    Direction::Long => s.signal.confidence,
                    Direction::Short => -s.signal.confidence,
                    Direction::Neutral => 0.0,
                })
                .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            vector.push(strongest);
        }
        CandidateFeatures { symbol: self.symbol.clone(), vector }
    }
}

/// Length of `Candidate::features().vector`.
pub const FEATURE_DIMS: usize = 3 + SignalType::ALL.len();
