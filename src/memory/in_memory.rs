// =============================================================================
// In-process memory store (cosine similarity over candidate features)
// =============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{CandidateFeatures, MemoryStore, PastOutcome, RealizedOutcome, SimilarOutcome};
use crate::coordinator::Decision;
use crate::error::MemoryError;

struct Entry {
    vector: Vec<f64>,
    outcome: PastOutcome,
}

/// Reference `MemoryStore` holding every recorded outcome in memory.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an outcome directly (e.g. from an offline export).
    pub fn insert(&self, features: &CandidateFeatures, realized_return: f64) {
        self.entries.write().push(Entry {
            vector: features.vector.clone(),
            outcome: PastOutcome {
                symbol: features.symbol.clone(),
                realized_return,
            },
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Cosine similarity, negative values floored at 0. `None` on zero vectors.
fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    let sim = dot / (na * nb);
    sim.is_finite().then(|| sim.clamp(0.0, 1.0))
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn query_similar(
        &self,
        features: &CandidateFeatures,
        threshold: f64,
    ) -> Result<Vec<SimilarOutcome>, MemoryError> {
        let entries = self.entries.read();
        let mut matches = Vec::new();
        for entry in entries.iter() {
            if entry.vector.len() != features.vector.len() {
                return Err(MemoryError::DimensionMismatch {
                    expected: entry.vector.len(),
                    got: features.vector.len(),
                });
            }
            if let Some(similarity) = cosine(&entry.vector, &features.vector) {
                if similarity >= threshold {
                    matches.push(SimilarOutcome {
                        outcome: entry.outcome.clone(),
                        similarity,
                    });
                }
            }
        }
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        debug!(symbol = %features.symbol, matches = matches.len(), "memory query complete");
        Ok(matches)
    }

    async fn record(&self, decision: &Decision, outcome: RealizedOutcome) -> Result<(), MemoryError> {
        self.insert(&decision.features, outcome.realized_return);
        debug!(
            symbol = %decision.symbol,
            realized_return = outcome.realized_return,
            "decision outcome recorded"
        );
        Ok(())
    }
}
