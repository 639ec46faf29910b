// =============================================================================
// Pipeline Configuration — immutable parameters for scanner, rules, coordinator
// =============================================================================
//
// Loaded once by the binary and passed into `DecisionPipeline::new`.  Every
// field carries a serde default so partial JSON files work; `validate`
// rejects inconsistent settings before any scan runs.
// =============================================================================

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::AgentWeights;
use crate::error::ConfigError;
use crate::evaluators::{
    EvaluatorRegistry, EvaluatorSettings, MomentumEvaluator, OrderFlowEvaluator, TechnicalEvaluator,
    VolumeEvaluator,
};
use crate::memory::MemoryConfig;
use crate::rules::{default_rules, Rule, RuleEngine};
use crate::scanner::{ScanStage, StageCriteria};
use crate::types::{SignalType, Symbol, Timeframe};

/// Slack for floating-point stage weight totals.
const WEIGHT_TOTAL_EPSILON: f64 = 1e-9;

// =============================================================================
// Default value functions
// =============================================================================

fn default_stages() -> Vec<ScanStage> {
    vec![
        ScanStage {
            name: "liquidity".into(),
            timeframe: Timeframe::M5,
            weight: 0.2,
            timeout_ms: 2_000,
            evaluators: vec![VolumeEvaluator::ID.into()],
            checks: vec![SignalType::VolumeSpike],
            criteria: StageCriteria {
                min_volume: Some(1_000_000.0),
                min_price: Some(1.0),
                ..StageCriteria::default()
            },
        },
        ScanStage {
            name: "momentum".into(),
            timeframe: Timeframe::M5,
            weight: 0.4,
            timeout_ms: 2_000,
            evaluators: vec![TechnicalEvaluator::ID.into(), MomentumEvaluator::ID.into()],
            checks: vec![SignalType::EmaCross, SignalType::VwapBreak, SignalType::RsiMomentum],
            criteria: StageCriteria {
                min_local_score: Some(0.34),
                min_signal_confidence: 0.2,
                ..StageCriteria::default()
            },
        },
        ScanStage {
            name: "confirmation".into(),
            timeframe: Timeframe::H1,
            weight: 0.4,
            timeout_ms: 3_000,
            evaluators: vec![TechnicalEvaluator::ID.into(), OrderFlowEvaluator::ID.into()],
            checks: vec![SignalType::EmaCross, SignalType::VwapBreak],
            criteria: StageCriteria {
                min_local_score: Some(0.5),
                ..StageCriteria::default()
            },
        },
    ]
}

fn default_weights() -> AgentWeights {
    [
        (TechnicalEvaluator::ID, 1.0),
        (VolumeEvaluator::ID, 0.8),
        (MomentumEvaluator::ID, 0.7),
        (OrderFlowEvaluator::ID, 0.5),
    ]
    .into_iter()
    .collect()
}

fn default_consensus_threshold() -> f64 {
    0.70
}
fn default_worker_pool_size() -> usize {
    8
}
fn default_tick_interval_secs() -> u64 {
    60
}

// =============================================================================
// PipelineConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered scan cascade.
    #[serde(default = "default_stages")]
    pub stages: Vec<ScanStage>,

    #[serde(default = "default_rules")]
    pub rules: Vec<Rule>,

    /// Evaluator trust weights used by the coordinator.
    #[serde(default = "default_weights")]
    pub weights: AgentWeights,

    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Symbols processed concurrently within a stage.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Tuning for the built-in evaluators.
    #[serde(default)]
    pub evaluators: EvaluatorSettings,

    // -- Binary-only settings ------------------------------------------------

    /// Scan universe used by the binary.
    #[serde(default)]
    pub symbols: Vec<Symbol>,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            rules: default_rules(),
            weights: default_weights(),
            consensus_threshold: default_consensus_threshold(),
            memory: MemoryConfig::default(),
            worker_pool_size: default_worker_pool_size(),
            evaluators: EvaluatorSettings::default(),
            symbols: Vec::new(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl PipelineConfig {
    /// Fail-fast consistency checks against the evaluators actually
    /// registered.
    pub fn validate(&self, registry: &EvaluatorRegistry) -> Result<(), ConfigError> {
        self.validate_stages(registry)?;

        for (id, weight) in self.weights.iter() {
            if !registry.contains(id) {
                return Err(ConfigError::UnknownWeightedEvaluator(id.to_string()));
            }
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::InvalidWeight { evaluator: id.to_string(), weight });
            }
        }

        unit_interval("consensus_threshold", self.consensus_threshold)?;
        unit_interval("memory.similarity_threshold", self.memory.similarity_threshold)?;
        unit_interval("memory.adjustment_weight", self.memory.adjustment_weight)?;

        if self.worker_pool_size == 0 {
            return Err(ConfigError::EmptyWorkerPool);
        }

        RuleEngine::new(self.rules.clone())?;
        Ok(())
    }

    fn validate_stages(&self, registry: &EvaluatorRegistry) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let mut names = HashSet::new();
        let mut total = 0.0;
        for stage in &self.stages {
            if !names.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.name.clone()));
            }
            if !(stage.weight.is_finite() && (0.0..=1.0).contains(&stage.weight)) {
                return Err(ConfigError::StageWeightOutOfRange {
                    stage: stage.name.clone(),
                    weight: stage.weight,
                });
            }
            total += stage.weight;
            if stage.timeout_ms == 0 {
                return Err(ConfigError::ZeroTimeout(stage.name.clone()));
            }

            let mut producible: HashSet<SignalType> = HashSet::new();
            for id in &stage.evaluators {
                let evaluator = registry.get(id).ok_or_else(|| ConfigError::UnknownStageEvaluator {
                    stage: stage.name.clone(),
                    evaluator: id.clone(),
                })?;
                producible.extend(evaluator.produces().iter().copied());
            }
            if let Some(check) = stage.checks.iter().find(|c| !producible.contains(*c)) {
                return Err(ConfigError::UnproducibleCheck {
                    stage: stage.name.clone(),
                    check: check.to_string(),
                });
            }
            if let Some(signal) = stage
                .criteria
                .required_signals
                .iter()
                .find(|s| !stage.checks.contains(*s))
            {
                return Err(ConfigError::RequiredSignalNotChecked {
                    stage: stage.name.clone(),
                    signal: signal.to_string(),
                });
            }
        }

        if !(total > 0.0 && total <= 1.0 + WEIGHT_TOTAL_EPSILON) {
            return Err(ConfigError::StageWeightTotal(total));
        }
        Ok(())
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse pipeline config from {}", path.display()))?;

        info!(
            path = %path.display(),
            stages = config.stages.len(),
            rules = config.rules.len(),
            consensus_threshold = config.consensus_threshold,
            "pipeline config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise pipeline config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "pipeline config saved (atomic)");
        Ok(())
    }

    /// Stage weights keyed by stage name, for logging.
    pub fn stage_weights(&self) -> BTreeMap<&str, f64> {
        self.stages.iter().map(|s| (s.name.as_str(), s.weight)).collect()
    }
}

fn unit_interval(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleKind;

    fn registry() -> EvaluatorRegistry {
        EvaluatorRegistry::with_builtins(&EvaluatorSettings::default())
    }

    #[test]
    fn default_config_has_expected_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.stages.len(), 3);
        assert!((cfg.consensus_threshold - 0.70).abs() < f64::EPSILON);
        assert_eq!(cfg.worker_pool_size, 8);
        assert!((cfg.memory.similarity_threshold - 0.80).abs() < f64::EPSILON);
        assert!((cfg.memory.adjustment_weight - 0.10).abs() < f64::EPSILON);
        assert_eq!(cfg.weights.get("technical"), Some(1.0));
        let total: f64 = cfg.stage_weights().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_config_validates() {
        assert_eq!(PipelineConfig::default().validate(&registry()), Ok(()));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "consensus_threshold": 0.8,
            "weights": { "technical": 2.0 },
            "memory": { "combine": "multiplicative" }
        }"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        assert!((cfg.consensus_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.weights.get("technical"), Some(2.0));
        assert_eq!(cfg.weights.get("volume"), None);
        assert_eq!(cfg.memory.combine, crate::memory::CombineMode::Multiplicative);
        assert_eq!(cfg.memory.min_matches, 3);
        assert_eq!(cfg.stages.len(), 3);
    }

    #[test]
    fn unknown_weighted_evaluator_fails_fast() {
        let mut cfg = PipelineConfig::default();
        cfg.weights = [("sentiment", 1.0)].into_iter().collect();
        assert_eq!(
            cfg.validate(&registry()),
            Err(ConfigError::UnknownWeightedEvaluator("sentiment".into()))
        );
    }

    #[test]
    fn stage_weight_total_must_be_sensible() {
        let mut cfg = PipelineConfig::default();
        cfg.stages[0].weight = 0.9;
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::StageWeightTotal(_))));

        for stage in &mut cfg.stages {
            stage.weight = 0.0;
        }
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::StageWeightTotal(_))));
    }

    #[test]
    fn stage_consistency_checks() {
        let mut cfg = PipelineConfig::default();
        cfg.stages[0].evaluators = vec!["nope".into()];
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::UnknownStageEvaluator { .. })));

        let mut cfg = PipelineConfig::default();
        cfg.stages[0].checks.push(SignalType::SpoofDetected);
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::UnproducibleCheck { .. })));

        let mut cfg = PipelineConfig::default();
        cfg.stages[2].criteria.required_signals = vec![SignalType::SpoofDetected];
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::RequiredSignalNotChecked { .. })));

        let mut cfg = PipelineConfig::default();
        cfg.stages[1].name = cfg.stages[0].name.clone();
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::DuplicateStage(_))));

        let mut cfg = PipelineConfig::default();
        cfg.stages[1].timeout_ms = 0;
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::ZeroTimeout(_))));
    }

    #[test]
    fn thresholds_and_pool_are_checked() {
        let mut cfg = PipelineConfig::default();
        cfg.consensus_threshold = 1.5;
        assert!(matches!(cfg.validate(&registry()), Err(ConfigError::ThresholdOutOfRange { .. })));

        let mut cfg = PipelineConfig::default();
        cfg.worker_pool_size = 0;
        assert_eq!(cfg.validate(&registry()), Err(ConfigError::EmptyWorkerPool));

        let mut cfg = PipelineConfig::default();
        cfg.rules.push(Rule::hard("daily_loss", RuleKind::MaxDailyLoss { max_loss_pct: 5.0 }));
        assert_eq!(cfg.validate(&registry()), Err(ConfigError::DuplicateRule("daily_loss".into())));
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = std::env::temp_dir().join(format!("cascade-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pipeline.json");

        let mut cfg = PipelineConfig::default();
        cfg.symbols = vec!["AAPL".into(), "TSLA".into()];
        cfg.save(&path).unwrap();
        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.symbols, cfg.symbols);
        assert_eq!(loaded.stages.len(), cfg.stages.len());
        assert_eq!(loaded.rules, cfg.rules);
        assert_eq!(loaded.weights.get("momentum"), Some(0.7));
        assert!(loaded.validate(&registry()).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
