// =============================================================================
// Technical evaluator — EMA crossover + VWAP break
// =============================================================================

use async_trait::async_trait;
use tracing::debug;

use super::{Evaluator, EvaluatorSettings};
use crate::error::EvaluatorError;
use crate::indicators::{ema_crossover, vwap};
use crate::types::{Direction, MarketSnapshot, Signal, SignalType};

const PRODUCES: [SignalType; 2] = [SignalType::EmaCross, SignalType::VwapBreak];

#[derive(Debug, Clone)]
pub struct TechnicalEvaluator {
    ema_fast: usize,
    ema_slow: usize,
    cross_lookback: usize,
    vwap_lookback: usize,
}

impl TechnicalEvaluator {
    pub const ID: &'static str = "technical";

    pub fn new(settings: &EvaluatorSettings) -> Self {
        Self {
            ema_fast: settings.ema_fast,
            ema_slow: settings.ema_slow,
            cross_lookback: settings.cross_lookback,
            vwap_lookback: settings.vwap_lookback,
        }
    }

    fn ema_signal(&self, snapshot: &MarketSnapshot) -> Option<Signal> {
        let closes = snapshot.closes();
        let cross = ema_crossover(&closes, self.ema_fast, self.ema_slow, self.cross_lookback)?;
        // Fresher and wider crosses score higher.
        let freshness = 1.0 - 0.1 * cross.bars_ago as f64;
        let confidence = (0.5 + cross.separation.abs() * 50.0).min(1.0) * freshness;
        Some(Signal::from_snapshot(
            Self::ID,
            snapshot,
            SignalType::EmaCross,
            cross.direction,
            confidence,
        ))
    }

    fn vwap_signal(&self, snapshot: &MarketSnapshot) -> Option<Signal> {
        let prev_close = snapshot.bars.last()?.close;
        let level = match snapshot.indicator("vwap") {
            Some(v) => v,
            None => {
                let start = snapshot.bars.len().saturating_sub(self.vwap_lookback);
                vwap(&snapshot.bars[start..])?
            }
        };
        if level <= 0.0 {
            return None;
        }

        let close = snapshot.close;
        let direction = if prev_close <= level && close > level {
            Direction::Long
        } else if prev_close >= level && close < level {
            Direction::Short
        } else {
            return None;
        };
        let distance = (close - level).abs() / level;
        Some(Signal::from_snapshot(
            Self::ID,
            snapshot,
            SignalType::VwapBreak,
            direction,
            (0.5 + distance * 25.0).min(1.0),
        ))
    }
}

#[async_trait]
impl Evaluator for TechnicalEvaluator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> &[SignalType] {
        &PRODUCES
    }

    async fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError> {
        if snapshot.bars.len() < self.ema_slow {
            return Err(EvaluatorError::InsufficientData(format!(
                "{} bars < EMA({}) on {}",
                snapshot.bars.len(),
                self.ema_slow,
                snapshot.symbol
            )));
        }

        let signals: Vec<Signal> = [self.ema_signal(snapshot), self.vwap_signal(snapshot)]
            .into_iter()
            .flatten()
            .collect();

        debug!(
            symbol = %snapshot.symbol,
            timeframe = %snapshot.timeframe,
            count = signals.len(),
            "technical evaluation complete"
        );
        Ok(signals)
    }
}
