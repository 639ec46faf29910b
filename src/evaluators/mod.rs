// =============================================================================
// Signal Evaluators
// =============================================================================
//
// Every analysis unit implements the same `Evaluator` capability: a pure
// function of a `MarketSnapshot` (plus its own immutable tuning) producing
// zero or more `Signal`s.  The scanner looks evaluators up by id through the
// `EvaluatorRegistry` and fans them out concurrently per symbol.
//
// Built-in variants:
//   - technical   — ema_cross, vwap_break
//   - volume      — volume_spike
//   - momentum    — rsi_momentum
//   - order_flow  — spoof_detected
// =============================================================================

pub mod momentum;
pub mod order_flow;
pub mod technical;
pub mod volume;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, EvaluatorError};
use crate::types::{MarketSnapshot, Signal, SignalType};

pub use momentum::MomentumEvaluator;
pub use order_flow::OrderFlowEvaluator;
pub use technical::TechnicalEvaluator;
pub use volume::VolumeEvaluator;

/// Uniform capability implemented by every analysis unit.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Stable id, matched against stage definitions and the weight table.
    fn id(&self) -> &str;

    /// Signal types this evaluator can emit.
    fn produces(&self) -> &[SignalType];

    /// Inspect a snapshot. An empty vec means "nothing observed".
    async fn evaluate(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError>;
}

// =============================================================================
// Tuning for the built-in evaluators
// =============================================================================

fn default_ema_fast() -> usize {
    9
}
fn default_ema_slow() -> usize {
    21
}
fn default_cross_lookback() -> usize {
    3
}
fn default_vwap_lookback() -> usize {
    20
}
fn default_volume_lookback() -> usize {
    20
}
fn default_spike_ratio() -> f64 {
    2.0
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_upper() -> f64 {
    60.0
}
fn default_rsi_lower() -> f64 {
    40.0
}
fn default_spoof_cancel_ratio() -> f64 {
    0.6
}
fn default_spoof_min_imbalance() -> f64 {
    0.3
}

/// Parameters for the built-in evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorSettings {
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    /// How many bars back an EMA cross still counts.
    #[serde(default = "default_cross_lookback")]
    pub cross_lookback: usize,
    #[serde(default = "default_vwap_lookback")]
    pub vwap_lookback: usize,
    #[serde(default = "default_volume_lookback")]
    pub volume_lookback: usize,
    /// Current volume over mean volume that counts as a spike.
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_upper")]
    pub rsi_upper: f64,
    #[serde(default = "default_rsi_lower")]
    pub rsi_lower: f64,
    #[serde(default = "default_spoof_cancel_ratio")]
    pub spoof_cancel_ratio: f64,
    #[serde(default = "default_spoof_min_imbalance")]
    pub spoof_min_imbalance: f64,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            cross_lookback: default_cross_lookback(),
            vwap_lookback: default_vwap_lookback(),
            volume_lookback: default_volume_lookback(),
            spike_ratio: default_spike_ratio(),
            rsi_period: default_rsi_period(),
            rsi_upper: default_rsi_upper(),
            rsi_lower: default_rsi_lower(),
            spoof_cancel_ratio: default_spoof_cancel_ratio(),
            spoof_min_imbalance: default_spoof_min_imbalance(),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Id-keyed set of evaluators. Immutable once handed to the scanner.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: BTreeMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four built-in evaluators.
    pub fn with_builtins(settings: &EvaluatorSettings) -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Arc<dyn Evaluator>> = vec![
            Arc::new(TechnicalEvaluator::new(settings)),
            Arc::new(VolumeEvaluator::new(settings)),
            Arc::new(MomentumEvaluator::new(settings)),
            Arc::new(OrderFlowEvaluator::new(settings)),
        ];
        for evaluator in builtins {
            registry
                .evaluators
                .insert(evaluator.id().to_string(), evaluator);
        }
        registry
    }

    /// Add an evaluator. Ids must be unique.
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) -> Result<(), ConfigError> {
        let id = evaluator.id().to_string();
        if self.evaluators.contains_key(&id) {
            return Err(ConfigError::DuplicateEvaluator(id));
        }
        self.evaluators.insert(id, evaluator);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.evaluators.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.evaluators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("ids", &self.evaluators.keys().collect::<Vec<_>>())
            .finish()
    }
}
