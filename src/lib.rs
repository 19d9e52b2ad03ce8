pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod strategy;

pub use adapters::{GameOutcomeProvider, InMemoryStore, OddsHistoryProvider, PostgresStore};
pub use config::AppConfig;
pub use coordination::{CancelReason, CancelToken};
pub use domain::{
    ConfidenceLevel, Game, GameOutcome, MarketType, OddsRecord, ScoredSignal, Selection, Signal,
    StrategyId,
};
pub use error::{Result, SharplineError};
pub use strategy::{
    BacktestEngine, BacktestReport, BacktestResult, ConfidenceScorer, OrchestrationReport,
    Orchestrator, SampleCategory, SignalProcessor, StrategyRegistry,
};
