// =============================================================================
// Cascade Scanner — hierarchical scan, rule gate and weighted consensus
// =============================================================================
//
//   universe ─► RecursiveScanner ─► RuleEngine ─► AgentCoordinator ─► Decision
//                  │                                  │
//                  └──────────── MemoryStore ─────────┘
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod evaluators;
pub mod indicators;
pub mod memory;
pub mod pipeline;
pub mod provider;
pub mod rules;
pub mod scanner;
pub mod types;

pub use config::PipelineConfig;
pub use coordinator::{AgentCoordinator, AgentWeights, Decision, DecisionOutcome};
pub use pipeline::{DecisionPipeline, TickReport};
pub use rules::{PortfolioContext, RuleEngine, RuleVerdict};
pub use scanner::{CancelSignal, Candidate, RecursiveScanner, ScanReport, ScanStage};
