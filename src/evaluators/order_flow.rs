// =============================================================================
// Order-flow evaluator — spoofing detection
// =============================================================================
//
// A lopsided book whose large resting orders are mostly cancelled before
// they fill is treated as spoofed liquidity.  The signal points *against*
// the spoofed wall: a fake bid wall is bearish, a fake ask wall bullish.
// =============================================================================

use async_trait::async_trait;

use super::{Evaluator, EvaluatorSettings};
use crate::error::EvaluatorError;
use crate::types::{Direction, MarketSnapshot, Signal, SignalType};

const PRODUCES: [SignalType; 1] = [SignalType::SpoofDetected];

#[derive(Debug, Clone)]
pub struct OrderFlowEvaluator {
    min_cancel_ratio: f64,
    min_imbalance: f64,
}

impl OrderFlowEvaluator {
    pub const ID: &'static str = "order_flow";

    pub fn new(settings: &EvaluatorSettings) -> Self {
        Self {
            min_cancel_ratio: settings.spoof_cancel_ratio,
            min_imbalance: settings.spoof_min_imbalance,
        }
    }
}

#[async_trait]
impl Evaluator for OrderFlowEvaluator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> &[SignalType] {
        &PRODUCES
    }

    async fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError> {
        let book = snapshot.order_book.as_ref().ok_or_else(|| {
            EvaluatorError::InsufficientData(format!("no order book for {}", snapshot.symbol))
        })?;

        let imbalance = book.imbalance();
        if book.cancel_ratio < self.min_cancel_ratio || imbalance.abs() < self.min_imbalance {
            return Ok(Vec::new());
        }

        let direction = if imbalance > 0.0 {
            Direction::Short
        } else {
            Direction::Long
        };
        let confidence = (book.cancel_ratio + imbalance.abs()) / 2.0;
        Ok(vec![Signal::from_snapshot(
            Self::ID,
            snapshot,
            SignalType::SpoofDetected,
            direction,
            confidence,
        )])
    }
}
