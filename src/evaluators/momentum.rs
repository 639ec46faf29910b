// =============================================================================
// Momentum evaluator — RSI band breakouts
// =============================================================================
//
// RSI above `rsi_upper` is bullish momentum, below `rsi_lower` is bearish.
// Confidence is the distance from the 50 midline, normalised to [0, 1].
// =============================================================================

use async_trait::async_trait;

use super::{Evaluator, EvaluatorSettings};
use crate::error::EvaluatorError;
use crate::indicators::rsi_last;
use crate::types::{Direction, MarketSnapshot, Signal, SignalType};

const PRODUCES: [SignalType; 1] = [SignalType::RsiMomentum];

#[derive(Debug, Clone)]
pub struct MomentumEvaluator {
    period: usize,
    upper: f64,
    lower: f64,
}

impl MomentumEvaluator {
    pub const ID: &'static str = "momentum";

    pub fn new(settings: &EvaluatorSettings) -> Self {
        Self {
            period: settings.rsi_period,
            upper: settings.rsi_upper,
            lower: settings.rsi_lower,
        }
    }
}

#[async_trait]
impl Evaluator for MomentumEvaluator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> &[SignalType] {
        &PRODUCES
    }

    async fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError> {
        let rsi = match snapshot.indicator("rsi") {
            Some(v) => v,
            None => rsi_last(&snapshot.closes(), self.period).ok_or_else(|| {
                EvaluatorError::InsufficientData(format!(
                    "RSI({}) not ready for {}",
                    self.period, snapshot.symbol
                ))
            })?,
        };

        let (direction, confidence) = if rsi >= self.upper {
            (Direction::Long, (rsi - 50.0) / 50.0)
        } else if rsi <= self.lower {
            (Direction::Short, (50.0 - rsi) / 50.0)
        } else {
            return Ok(Vec::new());
        };

        Ok(vec![Signal::from_snapshot(
            Self::ID,
            snapshot,
            SignalType::RsiMomentum,
            direction,
            confidence,
        )])
    }
}
