// =============================================================================
// Volume evaluator — relative-volume spikes
// =============================================================================

use async_trait::async_trait;

use super::{Evaluator, EvaluatorSettings};
use crate::error::EvaluatorError;
use crate::indicators::mean_volume;
use crate::types::{Direction, MarketSnapshot, Signal, SignalType};

const PRODUCES: [SignalType; 1] = [SignalType::VolumeSpike];

/// Flags bars whose volume is at least `spike_ratio` times the recent mean.
#[derive(Debug, Clone)]
pub struct VolumeEvaluator {
    lookback: usize,
    spike_ratio: f64,
}

impl VolumeEvaluator {
    pub const ID: &'static str = "volume";

    pub fn new(settings: &EvaluatorSettings) -> Self {
        Self {
            lookback: settings.volume_lookback.max(1),
            spike_ratio: settings.spike_ratio,
        }
    }
}

#[async_trait]
impl Evaluator for VolumeEvaluator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> &[SignalType] {
        &PRODUCES
    }

    async fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError> {
        let start = snapshot.bars.len().saturating_sub(self.lookback);
        let mean = mean_volume(&snapshot.bars[start..])
            .filter(|m| *m > 0.0)
            .ok_or_else(|| {
                EvaluatorError::InsufficientData(format!("no volume history for {}", snapshot.symbol))
            })?;

        let ratio = snapshot.volume / mean;
        if ratio < self.spike_ratio {
            return Ok(Vec::new());
        }

        let direction = if snapshot.close > snapshot.open {
            Direction::Long
        } else if snapshot.close < snapshot.open {
            Direction::Short
        } else {
            Direction::Neutral
        };
        // Exactly at the threshold scores 0.5, twice the threshold scores 1.0.
        let confidence = (ratio / (2.0 * self.spike_ratio)).min(1.0);
        Ok(vec![Signal::from_snapshot(
            Self::ID,
            snapshot,
            SignalType::VolumeSpike,
            direction,
            confidence,
        )])
    }
}
