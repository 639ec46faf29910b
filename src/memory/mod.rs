// =============================================================================
// Memory Store — historical-similarity lookups
// =============================================================================
//
// The store is external: the core only queries it for past outcomes of
// candidates that looked like the current one, and (after a trade resolves)
// records the realised outcome of a decision.  Recorded outcomes influence
// later queries only, never the decision that produced them.
//
// Every call from the core goes through `MemoryGate`, which owns its own
// timeout and turns any failure into "no adjustment".
// =============================================================================

pub mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coordinator::Decision;
use crate::error::MemoryError;

pub use in_memory::InMemoryStore;

/// Feature vector describing a candidate for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    pub symbol: String,
    pub vector: Vec<f64>,
}

/// Realised result of a past decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastOutcome {
    pub symbol: String,
    /// Fractional return of the trade (0.02 = +2 %).
    pub realized_return: f64,
}

impl PastOutcome {
    pub fn won(&self) -> bool {
        self.realized_return > 0.0
    }
}

/// A past outcome together with how similar its candidate was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarOutcome {
    pub outcome: PastOutcome,
    /// Similarity in [0, 1].
    pub similarity: f64,
}

/// Realised outcome reported back after a trade resolves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealizedOutcome {
    pub realized_return: f64,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Past outcomes whose candidate similarity is at least `threshold`.
    async fn query_similar(
        &self,
        features: &CandidateFeatures,
        threshold: f64,
    ) -> Result<Vec<SimilarOutcome>, MemoryError>;

    /// Feed a resolved decision back into the store.
    async fn record(&self, decision: &Decision, outcome: RealizedOutcome) -> Result<(), MemoryError>;
}

// =============================================================================
// Aggregated statistics
// =============================================================================

/// Similarity-weighted summary of the matches returned by a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub matches: usize,
    pub total_similarity: f64,
    /// Similarity-weighted fraction of winning outcomes.
    pub win_rate: f64,
    /// Similarity-weighted mean realised return.
    pub expectancy: f64,
}

impl OutcomeStats {
    /// `None` when there are no matches with positive similarity.
    pub fn from_matches(matches: &[SimilarOutcome]) -> Option<Self> {
        let mut total = 0.0;
        let mut wins = 0.0;
        let mut returns = 0.0;
        let mut count = 0;
        for m in matches {
            if !(m.similarity > 0.0) || !m.outcome.realized_return.is_finite() {
                continue;
            }
            count += 1;
            total += m.similarity;
            returns += m.similarity * m.outcome.realized_return;
            if m.outcome.won() {
                wins += m.similarity;
            }
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            matches: count,
            total_similarity: total,
            win_rate: wins / total,
            expectancy: returns / total,
        })
    }

    /// Signed confidence adjustment: `weight × (2 × win_rate − 1)`.
    pub fn confidence_delta(&self, weight: f64) -> f64 {
        weight * (2.0 * self.win_rate - 1.0)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// How the memory delta is folded into aggregate confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// `c + δ`
    Additive,
    /// `c × (1 + δ)`
    Multiplicative,
}

impl Default for CombineMode {
    fn default() -> Self {
        Self::Additive
    }
}

impl CombineMode {
    /// Apply `delta` to `confidence`, clamped to [0, 1].
    pub fn apply(self, confidence: f64, delta: f64) -> f64 {
        let adjusted = match self {
            Self::Additive => confidence + delta,
            Self::Multiplicative => confidence * (1.0 + delta),
        };
        adjusted.clamp(0.0, 1.0)
    }
}

fn default_true() -> bool {
    true
}
fn default_similarity_threshold() -> f64 {
    0.80
}
fn default_adjustment_weight() -> f64 {
    0.10
}
fn default_min_matches() -> usize {
    3
}
fn default_negative_expectancy_cutoff() -> f64 {
    -0.01
}
fn default_memory_timeout_ms() -> u64 {
    250
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Scanner drops final-stage candidates with strongly negative history.
    #[serde(default = "default_true")]
    pub filter_enabled: bool,
    /// Coordinator adjusts confidence from similar past outcomes.
    #[serde(default = "default_true")]
    pub adjustment_enabled: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_adjustment_weight")]
    pub adjustment_weight: f64,
    #[serde(default)]
    pub combine: CombineMode,
    /// Fewer matches than this are ignored by both filter and adjustment.
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
    /// Expectancy below this drops the candidate at the final stage.
    #[serde(default = "default_negative_expectancy_cutoff")]
    pub negative_expectancy_cutoff: f64,
    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            filter_enabled: true,
            adjustment_enabled: true,
            similarity_threshold: default_similarity_threshold(),
            adjustment_weight: default_adjustment_weight(),
            combine: CombineMode::Additive,
            min_matches: default_min_matches(),
            negative_expectancy_cutoff: default_negative_expectancy_cutoff(),
            timeout_ms: default_memory_timeout_ms(),
        }
    }
}

// =============================================================================
// Gate
// =============================================================================

/// Timeout-bounded, failure-tolerant access to a `MemoryStore`.
#[derive(Clone)]
pub struct MemoryGate {
    store: Arc<dyn MemoryStore>,
    timeout: Duration,
    min_matches: usize,
}

impl MemoryGate {
    pub fn new(store: Arc<dyn MemoryStore>, config: &MemoryConfig) -> Self {
        Self {
            store,
            timeout: Duration::from_millis(config.timeout_ms),
            min_matches: config.min_matches,
        }
    }

    /// Query and summarise. Errors, timeouts and thin evidence all yield `None`.
    pub async fn lookup(&self, features: &CandidateFeatures, threshold: f64) -> Option<OutcomeStats> {
        let result =
            tokio::time::timeout(self.timeout, self.store.query_similar(features, threshold)).await;

        let matches = match result {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!(symbol = %features.symbol, error = %e, "memory store query failed — no adjustment");
                return None;
            }
            Err(_) => {
                warn!(
                    symbol = %features.symbol,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "memory store query timed out — no adjustment"
                );
                return None;
            }
        };

        let stats = OutcomeStats::from_matches(&matches)?;
        if stats.matches < self.min_matches {
            debug!(
                symbol = %features.symbol,
                matches = stats.matches,
                min_matches = self.min_matches,
                "memory evidence too thin — ignored"
            );
            return None;
        }
        Some(stats)
    }

    /// Forward a resolved decision to the store, bounded by the same timeout.
    pub async fn record(&self, decision: &Decision, outcome: RealizedOutcome) -> Result<(), MemoryError> {
        match tokio::time::timeout(self.timeout, self.store.record(decision, outcome)).await {
            Ok(result) => result,
            Err(_) => Err(MemoryError::Unavailable(format!(
                "record timed out after {} ms",
                self.timeout.as_millis()
            ))),
        }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }
}

impl std::fmt::Debug for MemoryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGate")
            .field("timeout", &self.timeout)
            .field("min_matches", &self.min_matches)
            .finish()
    }
}
