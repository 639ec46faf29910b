// =============================================================================
// Weighted consensus — confidence aggregation and directional vote
// =============================================================================
//
//   c_e       = mean confidence of e's signals, one signal per stage
//   aggregate = Σ(w_e × c_e) / Σ(w_e)     over evaluators that responded
//   vote_d    = Σ(w_e × c_s / n_e)        over e's signals with direction d
//
// Each evaluator's weight enters the denominator once, however many stages
// or signal types it covered.  Evaluators that produced nothing appear in
// neither sum.  Signals from evaluators without a weight entry are ignored.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, StagedSignal};

/// Two direction votes closer than this are a tie.
const TIE_EPSILON: f64 = 1e-12;

/// Evaluator id → trust weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentWeights(BTreeMap<String, f64>);

impl AgentWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self(weights)
    }

    pub fn get(&self, evaluator_id: &str) -> Option<f64> {
        self.0.get(evaluator_id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for AgentWeights {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// How one evaluator entered the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub evaluator_id: String,
    pub weight: f64,
    /// Mean over the evaluator's per-stage signals.
    pub confidence: f64,
    /// Direction this evaluator's own signals lean.
    pub direction: Direction,
    /// Stages the evaluator's signals came from, ascending.
    pub stages: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionVotes {
    pub long: f64,
    pub short: f64,
    pub neutral: f64,
}

impl DirectionVotes {
    fn add(&mut self, direction: Direction, vote: f64) {
        match direction {
            Direction::Long => self.long += vote,
            Direction::Short => self.short += vote,
            Direction::Neutral => self.neutral += vote,
        }
    }

    fn merge(&mut self, other: &DirectionVotes) {
        self.long += other.long;
        self.short += other.short;
        self.neutral += other.neutral;
    }

    /// Strict plurality winner; any tie at the top is `Neutral`.
    pub fn winner(&self) -> Direction {
        let tallies = [
            (Direction::Long, self.long),
            (Direction::Short, self.short),
            (Direction::Neutral, self.neutral),
        ];
        let top = self.long.max(self.short).max(self.neutral);
        if top <= 0.0 {
            return Direction::Neutral;
        }
        let mut leaders = tallies.iter().filter(|(_, v)| (top - v).abs() <= TIE_EPSILON);
        match (leaders.next(), leaders.next()) {
            (Some((d, _)), None) => *d,
            _ => Direction::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    /// Weighted mean confidence in [0, 1]; 0 when nothing was weighted.
    pub confidence: f64,
    pub direction: Direction,
    pub votes: DirectionVotes,
    pub total_weight: f64,
    pub contributions: Vec<Contribution>,
}

/// Keep one signal per `(evaluator, stage)`: the most recent by timestamp,
/// the later one on equal timestamps.  Output is ordered by that key.
pub fn dedupe_signals(signals: &[StagedSignal]) -> Vec<StagedSignal> {
    let mut latest: BTreeMap<(String, usize), &StagedSignal> = BTreeMap::new();
    for s in signals {
        let key = (s.signal.evaluator_id.clone(), s.stage_index);
        match latest.get(&key) {
            Some(existing) if existing.signal.timestamp > s.signal.timestamp => {}
            _ => {
                latest.insert(key, s);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Aggregate already-deduplicated signals, one weight per evaluator.
pub fn weighted_consensus(signals: &[StagedSignal], weights: &AgentWeights) -> Consensus {
    let mut by_evaluator: BTreeMap<&str, Vec<&StagedSignal>> = BTreeMap::new();
    for staged in signals {
        by_evaluator
            .entry(staged.signal.evaluator_id.as_str())
            .or_default()
            .push(staged);
    }

    let mut contributions = Vec::with_capacity(by_evaluator.len());
    let mut numerator = 0.0;
    let mut total_weight = 0.0;
    let mut votes = DirectionVotes::default();

    for (evaluator_id, entries) in by_evaluator {
        let Some(weight) = weights.get(evaluator_id) else {
            continue;
        };
        if !(weight > 0.0) {
            continue;
        }

        let n = entries.len() as f64;
        let confidence = entries.iter().map(|s| s.signal.confidence).sum::<f64>() / n;
        let mut own = DirectionVotes::default();
        for s in &entries {
            own.add(s.signal.direction, weight * s.signal.confidence / n);
        }

        numerator += weight * confidence;
        total_weight += weight;
        votes.merge(&own);

        let mut stages: Vec<usize> = entries.iter().map(|s| s.stage_index).collect();
        stages.sort_unstable();
        stages.dedup();
        contributions.push(Contribution {
            evaluator_id: evaluator_id.to_string(),
            weight,
            confidence,
            direction: own.winner(),
            stages,
        });
    }

    let confidence = if total_weight > 0.0 {
        (numerator / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Consensus {
        confidence,
        direction: votes.winner(),
        votes,
        total_weight,
        contributions,
    }
}
