// =============================================================================
// Cascade Scanner — Main Entry Point
// =============================================================================
//
// Replays a captured market tick through the decision pipeline on a fixed
// interval.  Decisions are logged only; nothing is executed.
// =============================================================================

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cascade_scanner::evaluators::EvaluatorRegistry;
use cascade_scanner::memory::{InMemoryStore, MemoryStore};
use cascade_scanner::provider::ReplayProvider;
use cascade_scanner::types::MarketSnapshot;
use cascade_scanner::{CancelSignal, DecisionPipeline, PipelineConfig, PortfolioContext};

/// Captured input for one tick: account state plus every snapshot the
/// stages will ask for.
#[derive(Debug, Deserialize)]
struct ReplayFixture {
    portfolio: PortfolioContext,
    snapshots: Vec<MarketSnapshot>,
}

impl ReplayFixture {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay fixture from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse replay fixture from {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("cascade scanner starting up");

    let config_path =
        std::env::var("CASCADE_CONFIG").unwrap_or_else(|_| "pipeline_config.json".into());
    let mut config = PipelineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        PipelineConfig::default()
    });

    // Fixture snapshots decide which symbols can be scanned at all.
    let fixture_path =
        std::env::var("CASCADE_FIXTURE").unwrap_or_else(|_| "replay_fixture.json".into());
    let fixture = ReplayFixture::load(Path::new(&fixture_path))?;

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("CASCADE_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.symbols.is_empty() {
        let mut symbols: Vec<String> = fixture.snapshots.iter().map(|s| s.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        config.symbols = symbols;
    }

    info!(
        symbols = ?config.symbols,
        stages = ?config.stage_weights(),
        tick_interval_secs = config.tick_interval_secs,
        "Configured scan universe"
    );

    // ── 2. Build pipeline ────────────────────────────────────────────────
    let registry = EvaluatorRegistry::with_builtins(&config.evaluators);
    let provider = Arc::new(ReplayProvider::from_snapshots(fixture.snapshots));
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    let pipeline = DecisionPipeline::new(&config, &registry, provider, Some(memory))
        .context("pipeline configuration rejected")?;

    // ── 3. Shutdown wiring ───────────────────────────────────────────────
    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => warn!("Shutdown signal received — cancelling scan"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C — cancelling scan"),
            }
            cancel.cancel();
        });
    }

    info!("Pipeline running. Press Ctrl+C to stop.");

    // ── 4. Tick loop ─────────────────────────────────────────────────────
    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(config.tick_interval_secs.max(1)));
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let report = pipeline
            .run_tick(config.symbols.iter().cloned(), &fixture.portfolio, &cancel)
            .await;
        if report.scan.cancelled {
            break;
        }
        for decision in report.approved() {
            info!(
                tick_id = %report.tick_id,
                symbol = %decision.symbol,
                direction = %decision.direction,
                confidence = decision.aggregate_confidence,
                reason = %decision.reason,
                "APPROVED"
            );
        }
    }

    // ── 5. Persist effective config ──────────────────────────────────────
    if let Err(e) = config.save(&config_path) {
        error!(error = %e, "Failed to save pipeline config on shutdown");
    }

    info!("cascade scanner shut down complete.");
    Ok(())
}
