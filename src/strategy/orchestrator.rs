//! Strategy Orchestrator
//!
//! Fans (game x strategy) units out over a bounded worker pool, waits for
//! every unit at a single join point, then scores, deduplicates and resolves
//! conflicts across strategies. One failing unit never aborts the batch; it
//! is recorded as a [`RunError`] and the remaining units still report.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::OddsHistoryProvider;
use crate::config::OrchestratorConfig;
use crate::coordination::CancelToken;
use crate::domain::{Game, OddsRecord, ScoredSignal, Signal, StrategyId};
use crate::error::{Result, SharplineError};

use super::aggregation::{deduplicate, resolve_conflicts, sort_signals, SignalConflict};
use super::registry::StrategyRegistry;
use super::scoring::ConfidenceScorer;
use super::traits::{GameContext, SignalProcessor};

// ============================================================================
// Report types
// ============================================================================

/// A unit of work that did not produce signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Requested strategy id, absent for data errors that hit every strategy
    pub strategy: Option<String>,
    pub game_id: Option<String>,
    pub kind: String,
    pub message: String,
}

impl RunError {
    pub fn new(strategy: Option<String>, game_id: Option<String>, error: &SharplineError) -> Self {
        Self {
            strategy,
            game_id,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    pub fn is_for(&self, strategy: StrategyId) -> bool {
        self.strategy.as_deref() == Some(strategy.as_str())
    }
}

/// Output of one orchestration pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub signals: Vec<ScoredSignal>,
    pub conflicts: Vec<SignalConflict>,
    pub errors: Vec<RunError>,
    /// True when cancellation stopped the pass before every unit ran
    pub partial: bool,
    pub units_total: usize,
    pub units_completed: usize,
    /// Successfully completed units per strategy
    pub completed_by_strategy: BTreeMap<StrategyId, usize>,
}

impl OrchestrationReport {
    pub fn failures_for(&self, strategy: StrategyId) -> usize {
        self.errors.iter().filter(|e| e.is_for(strategy)).count()
    }
}

enum UnitOutcome {
    Done {
        strategy: StrategyId,
        ctx: Arc<GameContext>,
        result: Result<Vec<Signal>>,
    },
    Skipped,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    registry: Arc<StrategyRegistry>,
    scorer: Arc<ConfidenceScorer>,
    odds: Arc<dyn OddsHistoryProvider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        scorer: ConfidenceScorer,
        odds: Arc<dyn OddsHistoryProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            scorer: Arc::new(scorer),
            odds,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Resolve requested ids against the registry. An empty request selects
    /// every registered strategy. Unknown ids become error entries.
    pub fn resolve_strategies(
        &self,
        strategy_ids: &[String],
    ) -> (Vec<Arc<dyn SignalProcessor>>, Vec<RunError>) {
        if strategy_ids.is_empty() {
            let processors = self
                .registry
                .list_ids()
                .into_iter()
                .filter_map(|id| self.registry.get(id).ok())
                .collect();
            return (processors, Vec::new());
        }

        let mut processors: Vec<Arc<dyn SignalProcessor>> = Vec::new();
        let mut errors = Vec::new();
        for raw in strategy_ids {
            match self.registry.create(raw) {
                Ok(processor) => {
                    if !processors.iter().any(|p| p.id() == processor.id()) {
                        processors.push(processor);
                    }
                }
                Err(e) => {
                    warn!(strategy = %raw, error = %e, "skipping unknown strategy");
                    errors.push(RunError::new(Some(raw.clone()), None, &e));
                }
            }
        }
        (processors, errors)
    }

    /// Odds history for every configured market, restricted to `cutoff`
    pub async fn fetch_records(
        &self,
        game_id: &str,
        before: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OddsRecord>> {
        let mut records = Vec::new();
        for market in &self.config.markets {
            records.extend(self.odds.get_odds_records(game_id, *market, before).await?);
        }

        let fetched = records.len();
        records.retain(|r| r.observed_at <= cutoff);
        if records.len() != fetched {
            warn!(
                game_id,
                dropped = fetched - records.len(),
                "provider returned records past the cutoff"
            );
        }
        Ok(records)
    }

    /// Live pass: fetch odds known at `cutoff` and run the requested
    /// strategies over every game
    pub async fn run(
        &self,
        games: &[Game],
        cutoff: DateTime<Utc>,
        strategy_ids: &[String],
        cancel: &CancelToken,
    ) -> OrchestrationReport {
        info!(
            games = games.len(),
            strategies = strategy_ids.len(),
            %cutoff,
            "orchestration started"
        );

        let (processors, mut errors) = self.resolve_strategies(strategy_ids);

        let mut loads = stream::iter(games.iter().cloned())
            .map(|game| async move {
                let records = self.fetch_records(&game.id, cutoff, cutoff).await;
                (game, records)
            })
            .buffer_unordered(self.config.max_concurrency.max(1));

        let mut contexts = Vec::with_capacity(games.len());
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = loads.next() => match next {
                    Some((game, Ok(records))) => {
                        let game_id = game.id.clone();
                        match GameContext::new(game, records, cutoff) {
                            Ok(ctx) => contexts.push(ctx),
                            Err(e) => errors.push(RunError::new(None, Some(game_id), &e)),
                        }
                    }
                    Some((game, Err(e))) => {
                        warn!(game_id = %game.id, error = %e, "odds history unavailable, skipping game");
                        errors.push(RunError::new(None, Some(game.id), &e));
                    }
                    None => break,
                }
            }
        }
        drop(loads);

        contexts.sort_by(|a, b| a.game().id.cmp(&b.game().id));
        let mut report = self.execute(contexts, processors, cancel).await;
        if cancelled {
            report.partial = true;
        }
        errors.append(&mut report.errors);
        report.errors = errors;

        info!(
            signals = report.signals.len(),
            errors = report.errors.len(),
            partial = report.partial,
            "orchestration finished"
        );
        report
    }

    /// Run the requested strategies over prepared contexts. Each context
    /// carries its own cutoff.
    pub async fn evaluate(
        &self,
        contexts: Vec<GameContext>,
        strategy_ids: &[String],
        cancel: &CancelToken,
    ) -> OrchestrationReport {
        let (processors, mut errors) = self.resolve_strategies(strategy_ids);
        let mut report = self.execute(contexts, processors, cancel).await;
        errors.append(&mut report.errors);
        report.errors = errors;
        report
    }

    async fn execute(
        &self,
        contexts: Vec<GameContext>,
        processors: Vec<Arc<dyn SignalProcessor>>,
        cancel: &CancelToken,
    ) -> OrchestrationReport {
        let mut units = Vec::with_capacity(contexts.len() * processors.len());
        for ctx in contexts.into_iter().map(Arc::new) {
            for processor in &processors {
                units.push((Arc::clone(&ctx), Arc::clone(processor)));
            }
        }

        let mut report = OrchestrationReport {
            units_total: units.len(),
            ..Default::default()
        };

        let mut outcomes = stream::iter(units)
            .map(|(ctx, processor)| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return UnitOutcome::Skipped;
                    }
                    let strategy = processor.id();
                    let game_id = ctx.game().id.clone();
                    let task_ctx = Arc::clone(&ctx);
                    let joined =
                        tokio::task::spawn_blocking(move || processor.generate_signals(&task_ctx))
                            .await;

                    let result = match joined {
                        Ok(Ok(signals)) => check_signals(&ctx, strategy, signals),
                        Ok(Err(e)) => Err(SharplineError::processor_failure(
                            strategy.as_str(),
                            &game_id,
                            e.to_string(),
                        )),
                        Err(join_error) => Err(SharplineError::processor_failure(
                            strategy.as_str(),
                            &game_id,
                            panic_message(join_error),
                        )),
                    };
                    UnitOutcome::Done {
                        strategy,
                        ctx,
                        result,
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1));

        let mut scored = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.partial = true;
                    break;
                }
                next = outcomes.next() => match next {
                    Some(UnitOutcome::Done { strategy, ctx, result }) => {
                        report.units_completed += 1;
                        match result {
                            Ok(signals) => {
                                debug!(
                                    strategy = %strategy,
                                    game_id = %ctx.game().id,
                                    count = signals.len(),
                                    "unit completed"
                                );
                                *report.completed_by_strategy.entry(strategy).or_default() += 1;
                                scored.extend(signals.into_iter().map(|s| self.scorer.score(s, ctx.game())));
                            }
                            Err(e) => {
                                warn!(
                                    strategy = %strategy,
                                    game_id = %ctx.game().id,
                                    error = %e,
                                    "processor failed"
                                );
                                report.errors.push(RunError::new(
                                    Some(strategy.to_string()),
                                    Some(ctx.game().id.clone()),
                                    &e,
                                ));
                            }
                        }
                    }
                    Some(UnitOutcome::Skipped) => report.partial = true,
                    None => break,
                }
            }
        }

        let mut signals = deduplicate(scored);
        report.conflicts = resolve_conflicts(&mut signals);
        if let Some(min_level) = self.config.min_level {
            signals.retain(|s| s.level >= min_level);
        }
        sort_signals(&mut signals);
        report.signals = signals;
        report
    }
}

/// Reject signals for another game or backed by evidence past the cutoff
fn check_signals(ctx: &GameContext, strategy: StrategyId, signals: Vec<Signal>) -> Result<Vec<Signal>> {
    for signal in &signals {
        if signal.game_id != ctx.game().id {
            return Err(SharplineError::processor_failure(
                strategy.as_str(),
                &ctx.game().id,
                format!("emitted a signal for game {}", signal.game_id),
            ));
        }
        if signal.evidence.iter().any(|r| r.observed_at > ctx.cutoff()) {
            return Err(SharplineError::processor_failure(
                strategy.as_str(),
                &ctx.game().id,
                "cited evidence observed after the cutoff",
            ));
        }
    }
    Ok(signals)
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockOddsHistoryProvider;
    use crate::config::StrategiesConfig;
    use crate::domain::{ConflictStatus, MarketType, Selection};
    use crate::strategy::processors::fixtures::{ctx, game, pct, start};

    struct Fixed {
        id: StrategyId,
        selection: Selection,
        confidence: f64,
    }

    impl SignalProcessor for Fixed {
        fn id(&self) -> StrategyId {
            self.id
        }
        fn name(&self) -> &str {
            "fixed"
        }
        fn description(&self) -> &str {
            "always recommends the same side"
        }
        fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
            Ok(vec![Signal::new(
                self.id,
                &ctx.game().id,
                MarketType::Moneyline,
                self.selection,
                self.confidence,
                ctx.cutoff(),
            )?])
        }
    }

    struct Exploding;

    impl SignalProcessor for Exploding {
        fn id(&self) -> StrategyId {
            StrategyId::LateFlip
        }
        fn name(&self) -> &str {
            "exploding"
        }
        fn description(&self) -> &str {
            "panics on every game"
        }
        fn generate_signals(&self, _ctx: &GameContext) -> Result<Vec<Signal>> {
            panic!("boom")
        }
    }

    fn orchestrator(registry: StrategyRegistry, odds: MockOddsHistoryProvider) -> Orchestrator {
        Orchestrator::new(
            Arc::new(registry),
            ConfidenceScorer::neutral(),
            Arc::new(odds),
            OrchestratorConfig::default(),
        )
    }

    fn fixed(id: StrategyId, selection: Selection, confidence: f64) -> Arc<dyn SignalProcessor> {
        Arc::new(Fixed {
            id,
            selection,
            confidence,
        })
    }

    #[tokio::test]
    async fn test_conflict_surfaces_both_sides() {
        let registry = StrategyRegistry::new();
        registry.register(StrategyId::SharpAction, fixed(StrategyId::SharpAction, Selection::Home, 0.9));
        registry.register(StrategyId::PublicFade, fixed(StrategyId::PublicFade, Selection::Away, 0.4));
        let orch = orchestrator(registry, MockOddsHistoryProvider::new());

        let contexts = vec![ctx(vec![pct(MarketType::Moneyline, "circa", 60, 50.0, 50.0)])];
        let report = orch.evaluate(contexts, &[], &CancelToken::new()).await;

        assert_eq!(report.signals.len(), 2);
        assert_eq!(report.signals[0].final_confidence, 0.9);
        assert_eq!(report.signals[0].conflict, ConflictStatus::Primary);
        assert_eq!(report.signals[1].conflict, ConflictStatus::Suppressed);
        assert_eq!(report.conflicts.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_processor_is_isolated() {
        let registry = StrategyRegistry::new();
        registry.register(StrategyId::LateFlip, Arc::new(Exploding));
        registry.register(StrategyId::Consensus, fixed(StrategyId::Consensus, Selection::Home, 0.7));
        let orch = orchestrator(registry, MockOddsHistoryProvider::new());

        let contexts = vec![ctx(vec![pct(MarketType::Moneyline, "circa", 60, 50.0, 50.0)])];
        let report = orch.evaluate(contexts, &[], &CancelToken::new()).await;

        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].strategy(), StrategyId::Consensus);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, "processor_failure");
        assert!(report.errors[0].is_for(StrategyId::LateFlip));
        assert_eq!(report.units_completed, 2);
        assert!(!report.partial);
    }

    #[tokio::test]
    async fn test_unknown_strategy_reported_while_others_run() {
        let registry = StrategyRegistry::with_defaults(&StrategiesConfig::default());
        registry.register(StrategyId::Consensus, fixed(StrategyId::Consensus, Selection::Home, 0.7));
        let orch = orchestrator(registry, MockOddsHistoryProvider::new());

        let contexts = vec![ctx(vec![pct(MarketType::Moneyline, "circa", 60, 50.0, 50.0)])];
        let ids = vec!["consensus".to_string(), "astrology".to_string()];
        let report = orch.evaluate(contexts, &ids, &CancelToken::new()).await;

        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, "unknown_strategy");
        assert_eq!(report.errors[0].strategy.as_deref(), Some("astrology"));
    }

    #[tokio::test]
    async fn test_data_unavailable_skips_game() {
        let mut odds = MockOddsHistoryProvider::new();
        odds.expect_get_odds_records()
            .returning(|_, _, _| Err(SharplineError::DataUnavailable("feed down".into())));
        let registry = StrategyRegistry::new();
        registry.register(StrategyId::Consensus, fixed(StrategyId::Consensus, Selection::Home, 0.7));
        let orch = orchestrator(registry, odds);

        let report = orch
            .run(&[game()], start(), &[], &CancelToken::new())
            .await;

        assert!(report.signals.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, "data_unavailable");
        assert_eq!(report.errors[0].game_id.as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn test_run_drops_records_after_cutoff() {
        let mut odds = MockOddsHistoryProvider::new();
        odds.expect_get_odds_records().returning(|_, market, _| {
            Ok(vec![
                pct(market, "circa", 60, 50.0, 50.0),
                pct(market, "circa", -10, 50.0, 50.0),
            ])
        });
        let registry = StrategyRegistry::new();
        registry.register(StrategyId::Consensus, fixed(StrategyId::Consensus, Selection::Home, 0.7));
        let orch = orchestrator(registry, odds);

        let report = orch
            .run(&[game()], start(), &[], &CancelToken::new())
            .await;
        assert!(report.errors.is_empty());
        assert_eq!(report.signals.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_partial() {
        let registry = StrategyRegistry::new();
        registry.register(StrategyId::Consensus, fixed(StrategyId::Consensus, Selection::Home, 0.7));
        let orch = orchestrator(registry, MockOddsHistoryProvider::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let contexts = vec![ctx(vec![pct(MarketType::Moneyline, "circa", 60, 50.0, 50.0)])];
        let report = orch.evaluate(contexts, &[], &cancel).await;

        assert!(report.partial);
        assert_eq!(report.units_total, 1);
        assert_eq!(report.units_completed, 0);
    }
}
