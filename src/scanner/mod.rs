// =============================================================================
// Recursive Scanner — multi-stage candidate refinement across timeframes
// =============================================================================
//
// Stages run strictly in order; the survivors of stage i are the only input
// of stage i + 1.  Within a stage every symbol is processed independently on
// a bounded worker pool:
//
//   1. fetch the snapshot for the stage timeframe   (provider failure → drop)
//   2. fan out the stage's evaluators until the stage deadline
//   3. compute the stage-local score over completed evaluators
//   4. apply the stage criteria                     (any failure → drop)
//
// After the final stage the optional memory filter drops candidates whose
// similar past setups show strongly negative expectancy.
//
// A cancel signal aborts all in-flight symbol tasks.  Stage results are only
// committed once the whole stage has finished, so a cancelled scan returns
// the survivors of the last completed stage untouched.
// =============================================================================

pub mod cancel;
pub mod candidate;
pub mod fanout;
pub mod stage;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::evaluators::{Evaluator, EvaluatorRegistry};
use crate::memory::{MemoryConfig, MemoryGate};
use crate::provider::SnapshotProvider;
use crate::types::Symbol;

pub use cancel::CancelSignal;
pub use candidate::{Candidate, StageScore, FEATURE_DIMS};
pub use fanout::FanOutResult;
pub use stage::{LocalScore, ScanStage, StageCriteria};

// =============================================================================
// Reporting types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    /// One or more stage criteria failed.
    Criteria { failures: Vec<String> },
    /// The snapshot could not be fetched in time.
    Provider { error: String },
    /// Similar past setups lost money.
    NegativeExpectancy { expectancy: f64, matches: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedSymbol {
    pub symbol: Symbol,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub index: usize,
    pub name: String,
    pub entered: usize,
    pub survived: usize,
    pub dropped: Vec<DroppedSymbol>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Finalized candidates, sorted by symbol. When `cancelled` is set these
    /// are the survivors of the last completed stage and are not finalized.
    pub candidates: Vec<Candidate>,
    pub stages: Vec<StageSummary>,
    pub memory_filtered: Vec<DroppedSymbol>,
    pub cancelled: bool,
}

impl ScanReport {
    /// Survivor count after each completed stage, for auditing narrowing.
    pub fn survivors_per_stage(&self) -> Vec<usize> {
        self.stages.iter().map(|s| s.survived).collect()
    }
}

enum SymbolOutcome {
    Survived(Candidate),
    Dropped(DroppedSymbol),
}

// =============================================================================
// Scanner
// =============================================================================

pub struct RecursiveScanner {
    stages: Vec<Arc<ScanStage>>,
    /// Evaluators resolved per stage, in the order the stage lists them.
    stage_evaluators: Vec<Arc<Vec<Arc<dyn Evaluator>>>>,
    provider: Arc<dyn SnapshotProvider>,
    memory: Option<(MemoryGate, MemoryConfig)>,
    worker_pool_size: usize,
}

impl RecursiveScanner {
    /// Built only by `DecisionPipeline::new`, after `PipelineConfig::validate`
    /// has rejected unknown evaluator ids.
    pub(crate) fn new(
        stages: Vec<ScanStage>,
        registry: &EvaluatorRegistry,
        provider: Arc<dyn SnapshotProvider>,
        worker_pool_size: usize,
    ) -> Self {
        let stage_evaluators = stages
            .iter()
            .map(|stage| {
                Arc::new(
                    stage
                        .evaluators
                        .iter()
                        .filter_map(|id| registry.get(id))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();

        Self {
            stages: stages.into_iter().map(Arc::new).collect(),
            stage_evaluators,
            provider,
            memory: None,
            worker_pool_size: worker_pool_size.max(1),
        }
    }

    /// Enable the final-stage memory filter.
    pub fn with_memory_filter(mut self, gate: MemoryGate, config: MemoryConfig) -> Self {
        if config.filter_enabled {
            self.memory = Some((gate, config));
        }
        self
    }

    pub fn stages(&self) -> impl Iterator<Item = &ScanStage> {
        self.stages.iter().map(|s| s.as_ref())
    }

    /// Run the cascade over `universe`.
    pub async fn scan(
        &self,
        universe: impl IntoIterator<Item = Symbol>,
        cancel: &CancelSignal,
    ) -> ScanReport {
        let universe: BTreeSet<Symbol> = universe.into_iter().collect();
        let mut report = ScanReport::default();

        if universe.is_empty() {
            debug!("empty universe — nothing to scan");
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        let mut current: Vec<Candidate> = universe.into_iter().map(Candidate::new).collect();

        for (index, stage) in self.stages.iter().enumerate() {
            if current.is_empty() {
                debug!(stage = %stage.name, "no candidates left — skipping remaining stages");
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.run_stage(index, stage, current.clone(), &semaphore, cancel).await {
                Some((survivors, summary)) => {
                    info!(
                        stage = %stage.name,
                        timeframe = %stage.timeframe,
                        entered = summary.entered,
                        survived = summary.survived,
                        elapsed_ms = summary.elapsed_ms,
                        "scan stage complete"
                    );
                    report.stages.push(summary);
                    current = survivors;
                }
                None => {
                    warn!(stage = %stage.name, "scan cancelled — discarding in-flight stage work");
                    report.cancelled = true;
                    break;
                }
            }
        }

        if report.cancelled {
            report.candidates = current;
            return report;
        }

        let fully_scanned = report.stages.len() == self.stages.len();
        if fully_scanned && !current.is_empty() {
            match self.memory_filter(current, cancel).await {
                Some((kept, filtered)) => {
                    current = kept;
                    report.memory_filtered = filtered;
                }
                None => {
                    warn!("scan cancelled during memory filter");
                    report.cancelled = true;
                    return report;
                }
            }
            for candidate in &mut current {
                candidate.finalized = true;
            }
        }

        report.candidates = current;
        report
    }

    /// Process one stage. `None` when cancelled before the stage finished.
    async fn run_stage(
        &self,
        index: usize,
        stage: &Arc<ScanStage>,
        candidates: Vec<Candidate>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancelSignal,
    ) -> Option<(Vec<Candidate>, StageSummary)> {
        let started = Instant::now();
        let entered = candidates.len();
        let evaluators = self.stage_evaluators[index].clone();
        // One wall-clock budget for the whole stage, queueing included.
        let deadline = started + stage.timeout();

        let mut tasks = JoinSet::new();
        for candidate in candidates {
            tasks.spawn(process_symbol(
                index,
                stage.clone(),
                evaluators.clone(),
                self.provider.clone(),
                semaphore.clone(),
                deadline,
                candidate,
            ));
        }

        // Keyed by symbol so the committed result does not depend on task
        // completion order.
        let mut survived: BTreeMap<Symbol, Candidate> = BTreeMap::new();
        let mut dropped: BTreeMap<Symbol, DroppedSymbol> = BTreeMap::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return None;
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok(SymbolOutcome::Survived(c))) => {
                        survived.insert(c.symbol.clone(), c);
                    }
                    Some(Ok(SymbolOutcome::Dropped(d))) => {
                        dropped.insert(d.symbol.clone(), d);
                    }
                    Some(Err(e)) => {
                        // A panicking evaluator loses only its own symbol.
                        warn!(stage = %stage.name, error = %e, "symbol task aborted");
                    }
                },
            }
        }

        let summary = StageSummary {
            index,
            name: stage.name.clone(),
            entered,
            survived: survived.len(),
            dropped: dropped.into_values().collect(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        Some((survived.into_values().collect(), summary))
    }

    /// `None` when cancelled.
    async fn memory_filter(
        &self,
        candidates: Vec<Candidate>,
        cancel: &CancelSignal,
    ) -> Option<(Vec<Candidate>, Vec<DroppedSymbol>)> {
        let Some((gate, config)) = &self.memory else {
            return Some((candidates, Vec::new()));
        };

        let lookups = candidates.iter().map(|c| {
            let features = c.features();
            async move { gate.lookup(&features, config.similarity_threshold).await }
        });
        let stats = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            stats = join_all(lookups) => stats,
        };

        let mut kept = Vec::with_capacity(candidates.len());
        let mut filtered = Vec::new();
        for (candidate, stats) in candidates.into_iter().zip(stats) {
            match stats {
                Some(s) if s.expectancy < config.negative_expectancy_cutoff => {
                    info!(
                        symbol = %candidate.symbol,
                        expectancy = s.expectancy,
                        matches = s.matches,
                        "memory filter dropped candidate"
                    );
                    filtered.push(DroppedSymbol {
                        symbol: candidate.symbol,
                        reason: DropReason::NegativeExpectancy {
                            expectancy: s.expectancy,
                            matches: s.matches,
                        },
                    });
                }
                _ => kept.push(candidate),
            }
        }
        Some((kept, filtered))
    }
}

async fn process_symbol(
    index: usize,
    stage: Arc<ScanStage>,
    evaluators: Arc<Vec<Arc<dyn Evaluator>>>,
    provider: Arc<dyn SnapshotProvider>,
    semaphore: Arc<Semaphore>,
    deadline: Instant,
    mut candidate: Candidate,
) -> SymbolOutcome {
    let symbol = candidate.symbol.clone();
    let drop_with = |reason| {
        SymbolOutcome::Dropped(DroppedSymbol {
            symbol: symbol.clone(),
            reason,
        })
    };

    let _permit = match tokio::time::timeout_at(deadline, semaphore.acquire_owned()).await {
        Ok(Ok(p)) => p,
        Ok(Err(e)) => return drop_with(DropReason::Provider { error: e.to_string() }),
        Err(_) => {
            warn!(symbol = %symbol, stage = %stage.name, "no worker free before stage deadline — dropping symbol from stage");
            return drop_with(DropReason::Provider { error: "timed out waiting for a worker".to_string() });
        }
    };

    let snapshot = match tokio::time::timeout_at(
        deadline,
        provider.get_snapshot(&symbol, stage.timeframe),
    )
    .await
    {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            warn!(symbol = %symbol, stage = %stage.name, error = %e, "snapshot fetch failed — dropping symbol from stage");
            return drop_with(DropReason::Provider { error: e.to_string() });
        }
        Err(_) => {
            warn!(symbol = %symbol, stage = %stage.name, "snapshot fetch timed out — dropping symbol from stage");
            return drop_with(DropReason::Provider { error: "timed out".to_string() });
        }
    };

    let fanout = fanout::run_evaluators(&evaluators, &snapshot, deadline).await;
    let local = stage.local_score(&fanout.covered, &fanout.signals);
    let failures = stage.criteria.failures(&snapshot, &fanout.signals, local.score);

    if !failures.is_empty() {
        debug!(symbol = %symbol, stage = %stage.name, ?failures, "symbol failed stage criteria");
        return drop_with(DropReason::Criteria { failures });
    }

    debug!(
        symbol = %symbol,
        stage = %stage.name,
        local_score = local.score,
        signals = fanout.signals.len(),
        timed_out = fanout.timed_out.len(),
        "symbol passed stage"
    );
    candidate.record_stage(index, &stage, local, fanout, snapshot);
    SymbolOutcome::Survived(candidate)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{EvaluatorError, ProviderError};
    use crate::evaluators::test_support::snapshot_from_closes;
    use crate::memory::test_support::{outcome, FixedStore, HangingStore};
    use crate::provider::ReplayProvider;
    use crate::types::{Direction, MarketSnapshot, Signal, SignalType, Timeframe};

    /// Emits one fixed signal per snapshot.
    struct FixedEvaluator {
        id: &'static str,
        produces: Vec<SignalType>,
        confidence: f64,
    }

    #[async_trait]
    impl Evaluator for FixedEvaluator {
        fn id(&self) -> &str {
            self.id
        }
        fn produces(&self) -> &[SignalType] {
            &self.produces
        }
        async fn evaluate(&self, s: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError> {
            Ok(vec![Signal::from_snapshot(
                self.id,
                s,
                self.produces[0],
                Direction::Long,
                self.confidence,
            )])
        }
    }

    /// Never finishes.
    struct StuckEvaluator;

    #[async_trait]
    impl Evaluator for StuckEvaluator {
        fn id(&self) -> &str {
            "stuck"
        }
        fn produces(&self) -> &[SignalType] {
            &[SignalType::VolumeSpike]
        }
        async fn evaluate(&self, _s: &MarketSnapshot) -> Result<Vec<Signal>, EvaluatorError> {
            std::future::pending().await
        }
    }

    /// Provider that fails for one symbol and delegates the rest.
    struct FlakyProvider {
        inner: ReplayProvider,
        broken: &'static str,
    }

    #[async_trait]
    impl SnapshotProvider for FlakyProvider {
        async fn get_snapshot(&self, symbol: &str, tf: Timeframe) -> Result<MarketSnapshot, ProviderError> {
            if symbol == self.broken {
                return Err(ProviderError::Unavailable("feed down".into()));
            }
            self.inner.get_snapshot(symbol, tf).await
        }
    }

    fn snap(symbol: &str, tf: Timeframe, volume: f64) -> MarketSnapshot {
        let mut s = snapshot_from_closes(&[10.0, 10.0, 10.5], volume);
        s.symbol = symbol.into();
        s.timeframe = tf;
        s
    }

    fn registry() -> EvaluatorRegistry {
        let mut r = EvaluatorRegistry::new();
        r.register(Arc::new(FixedEvaluator {
            id: "technical",
            produces: vec![SignalType::EmaCross],
            confidence: 0.9,
        }))
        .unwrap();
        r.register(Arc::new(StuckEvaluator)).unwrap();
        r
    }

    fn liquidity_stage(min_volume: f64) -> ScanStage {
        ScanStage {
            name: "liquidity".into(),
            timeframe: Timeframe::D1,
            weight: 0.4,
            timeout_ms: 500,
            evaluators: vec![],
            checks: vec![],
            criteria: StageCriteria { min_volume: Some(min_volume), ..StageCriteria::default() },
        }
    }

    fn trend_stage(evaluators: Vec<&str>, checks: Vec<SignalType>, timeout_ms: u64) -> ScanStage {
        ScanStage {
            name: "trend".into(),
            timeframe: Timeframe::M5,
            weight: 0.6,
            timeout_ms,
            evaluators: evaluators.into_iter().map(String::from).collect(),
            checks,
            criteria: StageCriteria::default(),
        }
    }

    fn universe_provider(volumes: &[(&str, f64)]) -> ReplayProvider {
        let provider = ReplayProvider::new();
        for (sym, vol) in volumes {
            provider.insert(snap(sym, Timeframe::D1, *vol));
            provider.insert(snap(sym, Timeframe::M5, *vol));
        }
        provider
    }

    #[tokio::test]
    async fn empty_universe_is_empty_result() {
        let scanner = RecursiveScanner::new(
            vec![liquidity_stage(1.0)],
            &registry(),
            Arc::new(ReplayProvider::new()),
            4,
        );
        let report = scanner.scan(Vec::<Symbol>::new(), &CancelSignal::new()).await;
        assert!(report.candidates.is_empty());
        assert!(report.stages.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn cascade_narrows_monotonically() {
        let provider = universe_provider(&[
            ("A", 2_000_000.0),
            ("B", 500_000.0),
            ("C", 1_500_000.0),
            ("D", 3_000_000.0),
        ]);
        let stages = vec![
            liquidity_stage(1_000_000.0),
            ScanStage { name: "heavy".into(), ..liquidity_stage(1_800_000.0) },
            ScanStage { name: "heaviest".into(), ..liquidity_stage(2_500_000.0) },
        ];
        let scanner = RecursiveScanner::new(stages, &registry(), Arc::new(provider), 2);
        let report = scanner.scan(["A", "B", "C", "D"].map(String::from), &CancelSignal::new()).await;

        assert_eq!(report.survivors_per_stage(), vec![3, 2, 1]);
        let mut previous = 4;
        for summary in &report.stages {
            assert!(summary.survived <= previous);
            assert_eq!(summary.entered, previous);
            previous = summary.survived;
        }
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].symbol, "D");
        assert!(report.candidates[0].finalized);
    }

    #[tokio::test]
    async fn zero_survivors_short_circuits() {
        let provider = universe_provider(&[("A", 10.0)]);
        let stages = vec![liquidity_stage(1_000.0), trend_stage(vec!["technical"], vec![SignalType::EmaCross], 500)];
        let scanner = RecursiveScanner::new(stages, &registry(), Arc::new(provider), 2);
        let report = scanner.scan(["A".to_string()], &CancelSignal::new()).await;
        assert_eq!(report.stages.len(), 1);
        assert!(report.candidates.is_empty());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn signals_and_weighted_score_accumulate() {
        let provider = universe_provider(&[("A", 2_000_000.0)]);
        let stages = vec![
            liquidity_stage(1_000_000.0),
            trend_stage(vec!["technical"], vec![SignalType::EmaCross], 500),
        ];
        let scanner = RecursiveScanner::new(stages, &registry(), Arc::new(provider), 2);
        let report = scanner.scan(["A".to_string()], &CancelSignal::new()).await;

        let a = &report.candidates[0];
        assert_eq!(a.signals.len(), 1);
        assert_eq!(a.signals[0].stage_name, "trend");
        assert_eq!(a.signals[0].signal.timeframe, Timeframe::M5);
        // 0.4 × 1.0 (filter stage) + 0.6 × 1.0 (ema check satisfied)
        assert!((a.score - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn stuck_evaluator_degrades_to_completed_checks() {
        let provider = universe_provider(&[("A", 2_000_000.0)]);
        let stage = trend_stage(
            vec!["technical", "stuck"],
            vec![SignalType::EmaCross, SignalType::VolumeSpike],
            80,
        );
        let scanner = RecursiveScanner::new(vec![stage], &registry(), Arc::new(provider), 2);

        let started = std::time::Instant::now();
        let report = scanner.scan(["A".to_string()], &CancelSignal::new()).await;
        assert!(started.elapsed() < Duration::from_millis(80 + 500));

        let a = &report.candidates[0];
        let score = &a.stage_scores[0];
        assert_eq!(score.timed_out, vec!["stuck".to_string()]);
        assert_eq!(score.local.covered, 1);
        assert!((score.local.score - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn provider_failure_drops_only_that_symbol() {
        let provider = FlakyProvider {
            inner: universe_provider(&[("A", 2_000_000.0), ("B", 2_000_000.0)]),
            broken: "B",
        };
        let scanner = RecursiveScanner::new(vec![liquidity_stage(1.0)], &registry(), Arc::new(provider), 2);
        let report = scanner.scan(["A", "B"].map(String::from), &CancelSignal::new()).await;

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].symbol, "A");
        assert!(matches!(
            report.stages[0].dropped[0].reason,
            DropReason::Provider { .. }
        ));
    }

    #[tokio::test]
    async fn results_do_not_depend_on_pool_size() {
        let volumes: Vec<(String, f64)> = (0..20)
            .map(|i| (format!("S{i:02}"), 100_000.0 * i as f64))
            .collect();
        let provider = ReplayProvider::new();
        for (sym, vol) in &volumes {
            provider.insert(snap(sym, Timeframe::D1, *vol));
        }
        let provider: Arc<dyn SnapshotProvider> = Arc::new(provider);
        let symbols: Vec<String> = volumes.iter().map(|(s, _)| s.clone()).collect();

        let serial = RecursiveScanner::new(vec![liquidity_stage(1_000_000.0)], &registry(), provider.clone(), 1)
            .scan(symbols.clone(), &CancelSignal::new())
            .await;
        let parallel = RecursiveScanner::new(vec![liquidity_stage(1_000_000.0)], &registry(), provider, 16)
            .scan(symbols, &CancelSignal::new())
            .await;
        assert_eq!(serial.candidates, parallel.candidates);
        assert_eq!(serial.candidates.len(), 10);
    }

    #[tokio::test]
    async fn cancel_discards_in_flight_stage() {
        let provider = universe_provider(&[("A", 2_000_000.0), ("B", 2_000_000.0)]);
        let stages = vec![
            liquidity_stage(1.0),
            trend_stage(vec!["stuck"], vec![SignalType::VolumeSpike], 10_000),
        ];
        let scanner = RecursiveScanner::new(stages, &registry(), Arc::new(provider), 2);

        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let report = scanner.scan(["A", "B"].map(String::from), &cancel).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.cancelled);
        // Stage 1 results survive intact; stage 2 left no trace.
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.candidates.len(), 2);
        assert!(report.candidates.iter().all(|c| !c.finalized && c.stage_scores.len() == 1));
    }

    #[tokio::test]
    async fn memory_filter_drops_negative_expectancy() {
        let provider = universe_provider(&[("A", 2_000_000.0)]);
        let store = FixedStore(vec![outcome(0.9, -0.05), outcome(0.95, -0.03), outcome(0.85, 0.01)]);
        let config = MemoryConfig::default();
        let scanner = RecursiveScanner::new(vec![liquidity_stage(1.0)], &registry(), Arc::new(provider), 2)
            .with_memory_filter(MemoryGate::new(Arc::new(store), &config), config);

        let report = scanner.scan(["A".to_string()], &CancelSignal::new()).await;
        assert!(report.candidates.is_empty());
        assert_eq!(report.memory_filtered.len(), 1);
        assert_eq!(report.stages[0].survived, 1);
    }

    #[tokio::test]
    async fn memory_outage_keeps_candidates() {
        let provider = universe_provider(&[("A", 2_000_000.0)]);
        let config = MemoryConfig { timeout_ms: 20, ..MemoryConfig::default() };
        let scanner = RecursiveScanner::new(vec![liquidity_stage(1.0)], &registry(), Arc::new(provider), 2)
            .with_memory_filter(MemoryGate::new(Arc::new(HangingStore), &config), config);

        let report = scanner.scan(["A".to_string()], &CancelSignal::new()).await;
        assert_eq!(report.candidates.len(), 1);
        assert!(report.candidates[0].finalized);
    }

    #[tokio::test]
    async fn stage_deadline_covers_symbols_waiting_for_a_worker() {
        let provider = universe_provider(&[
            ("A", 2_000_000.0),
            ("B", 2_000_000.0),
            ("C", 2_000_000.0),
            ("D", 2_000_000.0),
        ]);
        let stage = trend_stage(
            vec!["technical", "stuck"],
            vec![SignalType::EmaCross, SignalType::VolumeSpike],
            100,
        );
        let scanner = RecursiveScanner::new(vec![stage], &registry(), Arc::new(provider), 1);

        let started = std::time::Instant::now();
        let report = scanner.scan(["A", "B", "C", "D"].map(String::from), &CancelSignal::new()).await;
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(100 + 150), "stage took {elapsed:?}");

        let summary = &report.stages[0];
        assert_eq!(summary.survived + summary.dropped.len(), 4);
        assert!(summary.survived >= 1);
        assert!(summary
            .dropped
            .iter()
            .all(|d| matches!(d.reason, DropReason::Provider { .. })));
    }
}
