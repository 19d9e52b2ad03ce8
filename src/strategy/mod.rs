//! Strategy module
//!
//! Signal processors and the machinery that runs them.
//!
//! ## Architecture
//!
//! - `traits` - the `SignalProcessor` interface and per-game context
//! - `processors/` - the nine built-in strategies
//! - `scoring` - weighted confidence model
//! - `registry/` - strategy registry and factory
//! - `aggregation` - deduplication and conflict resolution
//! - `orchestrator` - concurrent live pass
//! - `backtest` - replay over completed games

// =============================================================================
// Processor interface
// =============================================================================

pub mod processors;
pub mod traits;

pub use processors::{
    BookConflictProcessor, ConsensusProcessor, HybridSharpProcessor, LateFlipProcessor,
    LineMovementProcessor, PublicFadeProcessor, SharpActionProcessor, TimingBasedProcessor,
    UnderdogValueProcessor,
};
pub use traits::{GameContext, SignalProcessor};

// =============================================================================
// Scoring, registry and execution
// =============================================================================

pub mod aggregation;
pub mod backtest;
pub mod orchestrator;
pub mod registry;
pub mod scoring;

pub use aggregation::SignalConflict;
pub use backtest::{BacktestEngine, BacktestReport, BacktestResult, LevelStats, SampleCategory};
pub use orchestrator::{OrchestrationReport, Orchestrator, RunError};
pub use registry::{StrategyFactory, StrategyInfo, StrategyRegistry, StrategyStatus};
pub use scoring::ConfidenceScorer;
