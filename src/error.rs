// =============================================================================
// Error taxonomy
// =============================================================================
//
// Only `ConfigError` is fatal, and only at pipeline construction.  Every other
// error is recovered where it occurs: evaluator errors become "no signal",
// provider errors drop the symbol from the current stage, memory errors
// become "no adjustment", rule errors become a synthetic hard-fail violation.
// =============================================================================

use thiserror::Error;

use crate::types::Timeframe;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no scan stages configured")]
    NoStages,
    #[error("duplicate stage name `{0}`")]
    DuplicateStage(String),
    #[error("stage `{stage}` weight {weight} is outside [0, 1]")]
    StageWeightOutOfRange { stage: String, weight: f64 },
    #[error("stage weights sum to {0}, expected a total in (0, 1]")]
    StageWeightTotal(f64),
    #[error("stage `{0}` has a zero timeout")]
    ZeroTimeout(String),
    #[error("stage `{stage}` references unknown evaluator `{evaluator}`")]
    UnknownStageEvaluator { stage: String, evaluator: String },
    #[error("stage `{stage}` checks `{check}` but none of its evaluators produce it")]
    UnproducibleCheck { stage: String, check: String },
    #[error("stage `{stage}` requires `{signal}` which is not one of its checks")]
    RequiredSignalNotChecked { stage: String, signal: String },
    #[error("weight table references unknown evaluator `{0}`")]
    UnknownWeightedEvaluator(String),
    #[error("evaluator `{evaluator}` has invalid weight {weight}")]
    InvalidWeight { evaluator: String, weight: f64 },
    #[error("`{name}` = {value} is outside [0, 1]")]
    ThresholdOutOfRange { name: &'static str, value: f64 },
    #[error("worker pool size must be at least 1")]
    EmptyWorkerPool,
    #[error("duplicate rule id `{0}`")]
    DuplicateRule(String),
    #[error("rule `{rule}` is misconfigured: {reason}")]
    InvalidRule { rule: String, reason: String },
    #[error("duplicate evaluator id `{0}`")]
    DuplicateEvaluator(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no snapshot for {symbol}@{timeframe}")]
    NotFound { symbol: String, timeframe: Timeframe },
    #[error("snapshot provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluatorError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("evaluator failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemoryError {
    #[error("memory store unavailable: {0}")]
    Unavailable(String),
    #[error("feature vector has {got} columns, store expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("malformed portfolio context: {0}")]
    MalformedContext(String),
    #[error("candidate has no market snapshot")]
    MissingSnapshot,
}
