//! Command handlers for the `sharpline` binary

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::output::{print_items, print_json, OutputMode, SignalRow, StrategyRow};
use crate::adapters::{GameOutcomeProvider, InMemoryStore, OddsHistoryProvider, PostgresStore};
use crate::config::AppConfig;
use crate::coordination::{cancel_on_ctrl_c, CancelToken};
use crate::strategy::{BacktestEngine, ConfidenceScorer, Orchestrator, StrategyRegistry};

fn registry(config: &AppConfig) -> Arc<StrategyRegistry> {
    Arc::new(StrategyRegistry::with_defaults(&config.strategies))
}

/// Token cancelled by Ctrl-C and, when given, by a deadline
fn cancel_token(timeout_secs: Option<u64>) -> CancelToken {
    let token = match timeout_secs {
        Some(secs) => CancelToken::with_timeout(std::time::Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    cancel_on_ctrl_c(token.clone());
    token
}

/// Midnight UTC of `start` through midnight UTC after `end`
pub fn day_range(start: NaiveDate, end: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if end < start {
        bail!("--end {end} is before --start {start}");
    }
    let from = start
        .and_hms_opt(0, 0, 0)
        .context("invalid start date")?
        .and_utc();
    let to = end
        .and_hms_opt(0, 0, 0)
        .context("invalid end date")?
        .and_utc()
        + Duration::days(1);
    Ok((from, to))
}

pub fn list_strategies(config: &AppConfig, mode: OutputMode) -> Result<()> {
    let rows: Vec<StrategyRow> = registry(config).list().iter().map(StrategyRow::from).collect();
    print_items(&rows, mode)
}

pub async fn run_signals(
    config: &AppConfig,
    data: &Path,
    cutoff: Option<DateTime<Utc>>,
    strategies: &[String],
    game: Option<&str>,
    timeout_secs: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let store = Arc::new(
        InMemoryStore::from_json_file(data)
            .await
            .with_context(|| format!("failed to load dataset {}", data.display()))?,
    );
    let cutoff = cutoff.unwrap_or_else(Utc::now);

    let games: Vec<_> = store
        .games()
        .await
        .into_iter()
        .filter(|g| match game {
            Some(id) => g.id == id,
            None => g.start_time > cutoff,
        })
        .collect();
    info!(games = games.len(), %cutoff, "selected games");

    let orchestrator = Orchestrator::new(
        registry(config),
        ConfidenceScorer::new(config.scoring.clone()),
        store,
        config.orchestrator.clone(),
    );
    let cancel = cancel_token(timeout_secs);
    let report = orchestrator.run(&games, cutoff, strategies, &cancel).await;

    match mode {
        OutputMode::Json => print_json(&report)?,
        OutputMode::Table => {
            let rows: Vec<SignalRow> = report.signals.iter().map(SignalRow::from).collect();
            print_items(&rows, mode)?;
            for e in &report.errors {
                eprintln!(
                    "error [{}] strategy={} game={}: {}",
                    e.kind,
                    e.strategy.as_deref().unwrap_or("-"),
                    e.game_id.as_deref().unwrap_or("-"),
                    e.message
                );
            }
            if report.partial {
                eprintln!(
                    "partial results: {}/{} units completed",
                    report.units_completed, report.units_total
                );
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_backtest(
    config: &AppConfig,
    data: Option<&Path>,
    database_url: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
    strategies: &[String],
    timeout_secs: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let (from, to) = day_range(start, end)?;

    let (odds, games): (Arc<dyn OddsHistoryProvider>, Arc<dyn GameOutcomeProvider>) =
        match (data, database_url.or(config.database.url.as_deref())) {
            (Some(path), _) => {
                let store = Arc::new(
                    InMemoryStore::from_json_file(path)
                        .await
                        .with_context(|| format!("failed to load dataset {}", path.display()))?,
                );
                let odds: Arc<dyn OddsHistoryProvider> = store.clone();
                let games: Arc<dyn GameOutcomeProvider> = store;
                (odds, games)
            }
            (None, Some(url)) => {
                let store = Arc::new(
                    PostgresStore::new(url, config.database.max_connections)
                        .await
                        .context("failed to connect to PostgreSQL")?,
                );
                let odds: Arc<dyn OddsHistoryProvider> = store.clone();
                let games: Arc<dyn GameOutcomeProvider> = store;
                (odds, games)
            }
            (None, None) => bail!("backtest needs --data or a database URL"),
        };

    let engine = BacktestEngine::new(
        registry(config),
        ConfidenceScorer::new(config.scoring.clone()),
        odds,
        games,
        config.orchestrator.markets.clone(),
        config.backtest.clone(),
    );
    let cancel = cancel_token(timeout_secs);
    let report = engine.run(strategies, from, to, &cancel).await?;

    match mode {
        OutputMode::Json => print_json(&report)?,
        OutputMode::Table => {
            println!("run {} ({} .. {})", report.run_id, start, end);
            println!("{}", report.summary_table());
            if !report.errors.is_empty() {
                eprintln!("{} unit(s) failed or were skipped", report.errors.len());
            }
        }
    }
    Ok(())
}
