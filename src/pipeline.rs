// =============================================================================
// Decision Pipeline — one tick of scan → rules → coordinator
// =============================================================================
//
// Built once from a validated `PipelineConfig`; construction is the only
// place configuration errors can surface.  Each tick:
//
//   1. scan the universe through the stage cascade
//   2. evaluate every finalized candidate against the rule set
//   3. synthesize a Decision per candidate
//
// A cancelled scan yields no decisions.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::coordinator::{AgentCoordinator, AgentWeights, Decision};
use crate::error::{ConfigError, MemoryError};
use crate::evaluators::EvaluatorRegistry;
use crate::memory::{MemoryGate, MemoryStore, RealizedOutcome};
use crate::provider::SnapshotProvider;
use crate::rules::{PortfolioContext, RuleEngine};
use crate::scanner::{CancelSignal, RecursiveScanner, ScanReport};
use crate::types::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Unique identifier for this tick (UUID v4).
    pub tick_id: String,
    pub started_at: DateTime<Utc>,
    pub scan: ScanReport,
    /// One per finalized candidate, in symbol order.
    pub decisions: Vec<Decision>,
    pub elapsed_ms: u64,
}

impl TickReport {
    pub fn approved(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.is_approved())
    }
}

pub struct DecisionPipeline {
    scanner: RecursiveScanner,
    rules: RuleEngine,
    coordinator: AgentCoordinator,
    weights: AgentWeights,
    consensus_threshold: f64,
}

impl DecisionPipeline {
    pub fn new(
        config: &PipelineConfig,
        registry: &EvaluatorRegistry,
        provider: Arc<dyn SnapshotProvider>,
        memory: Option<Arc<dyn MemoryStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate(registry)?;
        let rules = RuleEngine::new(config.rules.clone())?;

        let scanner = RecursiveScanner::new(config.stages.clone(), registry, provider, config.worker_pool_size);
        let (scanner, coordinator) = match memory {
            Some(store) => {
                let gate = MemoryGate::new(store, &config.memory);
                (
                    scanner.with_memory_filter(gate.clone(), config.memory.clone()),
                    AgentCoordinator::new(Some(gate), config.memory.clone()),
                )
            }
            None => (scanner, AgentCoordinator::new(None, config.memory.clone())),
        };

        info!(
            stages = config.stages.len(),
            rules = rules.rules().len(),
            evaluators = registry.len(),
            worker_pool_size = config.worker_pool_size,
            consensus_threshold = config.consensus_threshold,
            "decision pipeline ready"
        );

        Ok(Self {
            scanner,
            rules,
            coordinator,
            weights: config.weights.clone(),
            consensus_threshold: config.consensus_threshold,
        })
    }

    pub async fn run_tick(
        &self,
        universe: impl IntoIterator<Item = Symbol>,
        portfolio: &PortfolioContext,
        cancel: &CancelSignal,
    ) -> TickReport {
        let tick_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();

        let scan = self.scanner.scan(universe, cancel).await;

        let decisions = if scan.cancelled {
            warn!(tick_id = %tick_id, "tick cancelled — no decisions synthesized");
            Vec::new()
        } else {
            let pending = scan.candidates.iter().map(|candidate| {
                let verdict = self.rules.evaluate(candidate, portfolio);
                self.coordinator
                    .synthesize(candidate, verdict, &self.weights, self.consensus_threshold)
            });
            join_all(pending).await
        };

        let report = TickReport {
            tick_id,
            started_at,
            scan,
            decisions,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            tick_id = %report.tick_id,
            survivors = ?report.scan.survivors_per_stage(),
            candidates = report.scan.candidates.len(),
            decisions = report.decisions.len(),
            approved = report.approved().count(),
            elapsed_ms = report.elapsed_ms,
            "tick complete"
        );
        report
    }

    pub async fn record_outcome(&self, decision: &Decision, outcome: RealizedOutcome) -> Result<(), MemoryError> {
        self.coordinator.record_outcome(decision, outcome).await
    }
}
