//! Backtest Engine
//!
//! Replays the live processors over completed games and grades every emitted
//! signal against the final score.
//!
//! For each game the processors only see odds observed inside the actionable
//! window `[start - max_staleness, start - min_lag)`, the cutoff is the game's
//! start time, and the outcome is stripped before the context is built.
//! Games are fetched one batch of `batch_days` at a time.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{GameOutcomeProvider, OddsHistoryProvider};
use crate::config::{BacktestConfig, OrchestratorConfig};
use crate::coordination::CancelToken;
use crate::domain::odds::profit_per_unit;
use crate::domain::{BetResult, ConfidenceLevel, Game, GameOutcome, MarketType, ScoredSignal, StrategyId};
use crate::error::{Result, SharplineError};

use super::orchestrator::{Orchestrator, RunError};
use super::registry::StrategyRegistry;
use super::scoring::ConfidenceScorer;
use super::traits::GameContext;

// ============================================================================
// Results
// ============================================================================

/// How much weight a record of graded bets can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleCategory {
    Insufficient,
    Basic,
    Reliable,
    Robust,
}

impl SampleCategory {
    pub fn from_bets(total_bets: u32) -> Self {
        match total_bets {
            0..=9 => Self::Insufficient,
            10..=24 => Self::Basic,
            25..=49 => Self::Reliable,
            _ => Self::Robust,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insufficient => "INSUFFICIENT",
            Self::Basic => "BASIC",
            Self::Reliable => "RELIABLE",
            Self::Robust => "ROBUST",
        }
    }
}

impl fmt::Display for SampleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record for one confidence level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub bets: u32,
    pub wins: u32,
    pub units_won: Decimal,
}

/// Aggregate performance of one strategy over the backtest range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: StrategyId,
    /// Graded wins plus losses; pushes are excluded
    pub total_bets: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub win_rate: f64,
    pub units_won: Decimal,
    /// Units won per unit wagered
    pub roi: f64,
    pub sample_category: SampleCategory,
    pub games_evaluated: u32,
    /// Games or signals for this strategy that could not be evaluated
    pub failed_units: u32,
    /// Date batches whose completed games could not be fetched at all
    pub failed_batches: u32,
    pub partial: bool,
    pub by_level: BTreeMap<ConfidenceLevel, LevelStats>,
}

#[derive(Debug, Default)]
struct Tally {
    wins: u32,
    losses: u32,
    pushes: u32,
    units_won: Decimal,
    games_evaluated: u32,
    failed_units: u32,
    failed_batches: u32,
    by_level: BTreeMap<ConfidenceLevel, LevelStats>,
}

impl Tally {
    fn record(&mut self, level: ConfidenceLevel, result: BetResult, profit: Decimal) {
        match result {
            BetResult::Push => {
                self.pushes += 1;
                return;
            }
            BetResult::Win => self.wins += 1,
            BetResult::Loss => self.losses += 1,
        }
        self.units_won += profit;

        let stats = self.by_level.entry(level).or_default();
        stats.bets += 1;
        if result == BetResult::Win {
            stats.wins += 1;
        }
        stats.units_won += profit;
    }

    fn finish(self, strategy: StrategyId, partial: bool) -> BacktestResult {
        let total_bets = self.wins + self.losses;
        let (win_rate, roi) = if total_bets > 0 {
            (
                self.wins as f64 / total_bets as f64,
                (self.units_won / Decimal::from(total_bets)).to_f64().unwrap_or(0.0),
            )
        } else {
            (0.0, 0.0)
        };

        BacktestResult {
            strategy,
            total_bets,
            wins: self.wins,
            losses: self.losses,
            pushes: self.pushes,
            win_rate,
            units_won: self.units_won,
            roi,
            sample_category: SampleCategory::from_bets(total_bets),
            games_evaluated: self.games_evaluated,
            failed_units: self.failed_units,
            failed_batches: self.failed_batches,
            partial,
            by_level: self.by_level,
        }
    }
}

/// Output of one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub results: Vec<BacktestResult>,
    pub errors: Vec<RunError>,
    pub partial: bool,
}

#[derive(Debug, Serialize, Tabled)]
pub struct BacktestRow {
    pub strategy: String,
    pub bets: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub win_rate: String,
    pub units: String,
    pub roi: String,
    pub sample: String,
    pub games: u32,
    pub failed: u32,
}

impl From<&BacktestResult> for BacktestRow {
    fn from(r: &BacktestResult) -> Self {
        Self {
            strategy: r.strategy.to_string(),
            bets: r.total_bets,
            wins: r.wins,
            losses: r.losses,
            pushes: r.pushes,
            win_rate: format!("{:.1}%", r.win_rate * 100.0),
            units: format!("{:+.2}", r.units_won.round_dp(2)),
            roi: format!("{:+.1}%", r.roi * 100.0),
            sample: r.sample_category.to_string(),
            games: r.games_evaluated,
            failed: r.failed_units,
        }
    }
}

impl BacktestReport {
    pub fn rows(&self) -> Vec<BacktestRow> {
        self.results.iter().map(BacktestRow::from).collect()
    }

    /// Text table of per-strategy results
    pub fn summary_table(&self) -> String {
        let mut out = Table::new(self.rows()).to_string();
        if self.partial {
            out.push_str("\n(partial: run was cancelled before every game was processed)");
        }
        out
    }

    pub fn result_for(&self, strategy: StrategyId) -> Option<&BacktestResult> {
        self.results.iter().find(|r| r.strategy == strategy)
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct BacktestEngine {
    orchestrator: Orchestrator,
    games: Arc<dyn GameOutcomeProvider>,
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        scorer: ConfidenceScorer,
        odds: Arc<dyn OddsHistoryProvider>,
        games: Arc<dyn GameOutcomeProvider>,
        markets: Vec<MarketType>,
        config: BacktestConfig,
    ) -> Self {
        let orchestrator_config = OrchestratorConfig {
            max_concurrency: config.max_concurrency,
            markets,
            min_level: None,
        };
        Self {
            orchestrator: Orchestrator::new(registry, scorer, odds, orchestrator_config),
            games,
            config,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// `[open, close)` range of observation times usable for `game`
    pub fn actionable_window(&self, game: &Game) -> (DateTime<Utc>, DateTime<Utc>) {
        let open = game.start_time - Duration::minutes(self.config.max_staleness_minutes);
        let close = game.start_time - Duration::seconds(self.config.min_lag_secs.max(0));
        (open, close)
    }

    /// Context for `game` as a bettor would have seen it before first pitch
    async fn build_context(&self, game: &Game) -> Result<GameContext> {
        let (open, close) = self.actionable_window(game);
        let mut records = self
            .orchestrator
            .fetch_records(&game.id, close, game.start_time)
            .await?;
        records.retain(|r| r.observed_at >= open && r.observed_at < close);

        let mut blind = game.clone();
        blind.outcome = None;
        GameContext::new(blind, records, game.start_time)
    }

    pub async fn run(
        &self,
        strategy_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<BacktestReport> {
        if start > end {
            return Err(SharplineError::InvalidInput(format!(
                "backtest range ends before it starts: {start} .. {end}"
            )));
        }

        let run_id = Uuid::new_v4();
        let (processors, mut errors) = self.orchestrator.resolve_strategies(strategy_ids);
        let strategies: Vec<StrategyId> = processors.iter().map(|p| p.id()).collect();
        let ids: Vec<String> = strategies.iter().map(|s| s.to_string()).collect();
        let mut tallies: BTreeMap<StrategyId, Tally> =
            strategies.iter().map(|s| (*s, Tally::default())).collect();

        info!(
            %run_id,
            %start,
            %end,
            strategies = ?ids,
            "backtest started"
        );

        let step = Duration::days(self.config.batch_days.max(1));
        let mut partial = false;
        let mut batch_start = start;
        while batch_start < end && !strategies.is_empty() {
            if cancel.is_cancelled() {
                partial = true;
                break;
            }
            let batch_end = (batch_start + step).min(end);

            let games = match self.games.get_completed_games(batch_start, batch_end).await {
                Ok(games) => games,
                Err(e) => {
                    warn!(%batch_start, %batch_end, error = %e, "skipping batch");
                    errors.push(RunError::new(None, None, &e));
                    for tally in tallies.values_mut() {
                        tally.failed_batches += 1;
                    }
                    batch_start = batch_end;
                    continue;
                }
            };
            let completed: Vec<Game> = games.into_iter().filter(Game::is_backtestable).collect();
            let outcomes: HashMap<String, GameOutcome> = completed
                .iter()
                .filter_map(|g| g.outcome.map(|o| (g.id.clone(), o)))
                .collect();

            let built: Vec<(String, Result<GameContext>)> = stream::iter(completed.iter())
                .map(|game| async move { (game.id.clone(), self.build_context(game).await) })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .collect()
                .await;

            let mut contexts = Vec::with_capacity(built.len());
            for (game_id, result) in built {
                match result {
                    Ok(ctx) => contexts.push(ctx),
                    Err(e) => {
                        warn!(game_id = %game_id, error = %e, "skipping game");
                        errors.push(RunError::new(None, Some(game_id), &e));
                        for tally in tallies.values_mut() {
                            tally.failed_units += 1;
                        }
                    }
                }
            }
            contexts.sort_by(|a, b| a.game().id.cmp(&b.game().id));

            debug!(
                %batch_start,
                %batch_end,
                games = contexts.len(),
                "evaluating batch"
            );
            let report = self.orchestrator.evaluate(contexts, &ids, cancel).await;

            for (strategy, tally) in tallies.iter_mut() {
                tally.games_evaluated += report
                    .completed_by_strategy
                    .get(strategy)
                    .copied()
                    .unwrap_or(0) as u32;
                tally.failed_units += report.failures_for(*strategy) as u32;
            }
            errors.extend(report.errors);

            for scored in &report.signals {
                if scored.final_confidence < self.config.min_confidence {
                    continue;
                }
                let Some(outcome) = outcomes.get(scored.game_id()) else {
                    continue;
                };
                let Some(tally) = tallies.get_mut(&scored.strategy()) else {
                    continue;
                };
                match self.grade(scored, outcome) {
                    Ok((result, profit)) => tally.record(scored.level, result, profit),
                    Err(e) => {
                        tally.failed_units += 1;
                        errors.push(RunError::new(
                            Some(scored.strategy().to_string()),
                            Some(scored.game_id().to_string()),
                            &e,
                        ));
                    }
                }
            }

            if report.partial {
                partial = true;
                break;
            }
            batch_start = batch_end;
        }

        let results: Vec<BacktestResult> = tallies
            .into_iter()
            .map(|(strategy, tally)| tally.finish(strategy, partial))
            .collect();

        for r in &results {
            info!(
                %run_id,
                strategy = %r.strategy,
                bets = r.total_bets,
                wins = r.wins,
                win_rate = r.win_rate,
                roi = r.roi,
                sample = %r.sample_category,
                "backtest result"
            );
        }

        Ok(BacktestReport {
            run_id,
            start,
            end,
            results,
            errors,
            partial,
        })
    }

    /// Grade one signal; returns the result and profit in units for a
    /// one-unit stake
    fn grade(&self, scored: &ScoredSignal, outcome: &GameOutcome) -> Result<(BetResult, Decimal)> {
        let signal = &scored.signal;
        let result = outcome.grade(signal.market, signal.selection, signal.line)?;
        let price = match signal.price {
            Some(price) if self.config.use_actual_price => price,
            _ => self.config.assumed_price,
        };
        let profit = match result {
            BetResult::Win => profit_per_unit(price),
            BetResult::Loss => -Decimal::ONE,
            BetResult::Push => Decimal::ZERO,
        };
        Ok((result, profit))
    }
}
