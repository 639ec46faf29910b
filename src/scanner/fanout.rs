// =============================================================================
// Evaluator fan-out for one symbol on one stage
// =============================================================================
//
// All evaluators run concurrently against the same snapshot and share one
// deadline.  Whatever finishes in time is kept; a timed-out or failing
// evaluator contributes no signal and leaves its checks uncovered.
// =============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::evaluators::Evaluator;
use crate::types::{MarketSnapshot, Signal, SignalType};

#[derive(Debug, Default)]
pub struct FanOutResult {
    pub signals: Vec<Signal>,
    /// Signal types produced by evaluators that completed.
    pub covered: BTreeSet<SignalType>,
    pub timed_out: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn run_evaluators(
    evaluators: &[Arc<dyn Evaluator>],
    snapshot: &MarketSnapshot,
    deadline: Instant,
) -> FanOutResult {
    let calls = evaluators.iter().map(|evaluator| async move {
        let result = timeout_at(deadline, evaluator.evaluate(snapshot)).await;
        (evaluator, result)
    });

    let mut out = FanOutResult::default();
    // join_all preserves input order, so the result is independent of
    // completion order.
    for (evaluator, result) in join_all(calls).await {
        let id = evaluator.id();
        match result {
            Ok(Ok(signals)) => {
                out.covered.extend(evaluator.produces().iter().copied());
                out.signals.extend(signals.into_iter().filter(|s| {
                    s.symbol == snapshot.symbol && evaluator.produces().contains(&s.signal_type)
                }));
            }
            Ok(Err(e)) => {
                debug!(symbol = %snapshot.symbol, evaluator = id, error = %e, "evaluator failed — no signal");
                out.failed.push(id.to_string());
            }
            Err(_) => {
                debug!(symbol = %snapshot.symbol, evaluator = id, "evaluator timed out — no signal");
                out.timed_out.push(id.to_string());
            }
        }
    }
    out
}
