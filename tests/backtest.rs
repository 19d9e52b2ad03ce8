mod common;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{moneyline_record, pct_record, rich_dataset, start};
use sharpline::adapters::{Dataset, InMemoryStore};
use sharpline::config::{AppConfig, BacktestConfig};
use sharpline::domain::{Game, MarketType, OddsRecord, Selection, Signal, StrategyId};
use sharpline::error::{Result, SharplineError};
use sharpline::strategy::{
    BacktestEngine, ConfidenceScorer, GameContext, SampleCategory, SignalProcessor,
    StrategyRegistry,
};
use sharpline::CancelToken;

/// Backs the home moneyline and remembers every record it was shown
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, DateTime<Utc>)>>,
    saw_outcome: Mutex<bool>,
}

impl SignalProcessor for Recorder {
    fn id(&self) -> StrategyId {
        StrategyId::SharpAction
    }

    fn name(&self) -> &str {
        "recorder"
    }

    fn description(&self) -> &str {
        "backs the home side and records its inputs"
    }

    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(ctx.records().iter().map(|r| (r.game_id.clone(), r.observed_at)));
        }
        if ctx.game().outcome.is_some() {
            if let Ok(mut flag) = self.saw_outcome.lock() {
                *flag = true;
            }
        }
        if ctx.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Signal::new(
            self.id(),
            &ctx.game().id,
            MarketType::Moneyline,
            Selection::Home,
            0.75,
            ctx.cutoff(),
        )?
        .with_evidence(ctx.records().to_vec())])
    }
}

/// Fails on one game, backs home everywhere else
struct FlakyOn(&'static str);

impl SignalProcessor for FlakyOn {
    fn id(&self) -> StrategyId {
        StrategyId::Consensus
    }

    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "fails on a single game"
    }

    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
        if ctx.game().id == self.0 {
            return Err(SharplineError::Internal("bad input".into()));
        }
        Ok(vec![Signal::new(
            self.id(),
            &ctx.game().id,
            MarketType::Moneyline,
            Selection::Home,
            0.6,
            ctx.cutoff(),
        )?])
    }
}

fn day() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
    )
}

fn engine_with(registry: StrategyRegistry, dataset: Dataset) -> BacktestEngine {
    let store = Arc::new(InMemoryStore::from_dataset(dataset).unwrap());
    BacktestEngine::new(
        Arc::new(registry),
        ConfidenceScorer::neutral(),
        store.clone(),
        store,
        MarketType::ALL.to_vec(),
        BacktestConfig::default(),
    )
}

fn two_games() -> Dataset {
    let g1 = Game::new("g1", "NYY", "BOS", start()).unwrap().with_outcome(4, 1);
    let g2 = Game::new("g2", "LAD", "SF", start() + Duration::hours(1))
        .unwrap()
        .with_outcome(0, 3);
    let odds = vec![
        moneyline_record(&g1, "circa", 20, -120, 105, 40.0, 60.0),
        moneyline_record(&g2, "circa", 20, -120, 105, 40.0, 60.0),
    ];
    Dataset {
        games: vec![g1, g2],
        odds,
    }
}

#[tokio::test]
async fn records_outside_the_actionable_window_never_reach_processors() {
    let g = Game::new("g1", "NYY", "BOS", start()).unwrap().with_outcome(3, 2);
    let dataset = Dataset {
        odds: vec![
            // stale
            pct_record(&g, MarketType::Moneyline, "circa", 120, 40.0, 60.0),
            // actionable
            pct_record(&g, MarketType::Moneyline, "circa", 20, 40.0, 60.0),
            // inside the minimum lag
            seconds_before(&g, 10),
            // after first pitch
            pct_record(&g, MarketType::Moneyline, "circa", -15, 90.0, 10.0),
        ],
        games: vec![g],
    };

    let recorder = Arc::new(Recorder::default());
    let registry = StrategyRegistry::new();
    registry.register(StrategyId::SharpAction, recorder.clone());
    let (from, to) = day();
    let report = engine_with(registry, dataset)
        .run(&[], from, to, &CancelToken::new())
        .await
        .unwrap();

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, start() - Duration::minutes(20));
    assert!(seen.iter().all(|(_, t)| *t < start()));
    assert!(!*recorder.saw_outcome.lock().unwrap());

    let result = report.result_for(StrategyId::SharpAction).unwrap();
    assert_eq!(result.total_bets, 1);
    assert_eq!(result.wins, 1);
}

fn seconds_before(game: &Game, secs: i64) -> OddsRecord {
    OddsRecord::builder(&game.id, MarketType::Moneyline, "circa", game.start_time - Duration::seconds(secs))
        .percentages(85.0, 15.0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn one_right_one_wrong_is_a_coin_flip() {
    let registry = StrategyRegistry::new();
    registry.register(StrategyId::SharpAction, Arc::new(Recorder::default()));
    let (from, to) = day();
    let report = engine_with(registry, two_games())
        .run(&["sharp_action".to_string()], from, to, &CancelToken::new())
        .await
        .unwrap();

    let r = report.result_for(StrategyId::SharpAction).unwrap();
    assert_eq!(r.total_bets, 2);
    assert_eq!(r.wins, 1);
    assert_eq!(r.losses, 1);
    assert_eq!(r.win_rate, 0.5);
    assert_eq!(r.sample_category, SampleCategory::Insufficient);
    assert_eq!(r.games_evaluated, 2);
    assert!(!r.partial);
}

#[tokio::test]
async fn failing_game_does_not_hide_other_results() {
    let registry = StrategyRegistry::new();
    registry.register(StrategyId::Consensus, Arc::new(FlakyOn("g1")));
    registry.register(StrategyId::SharpAction, Arc::new(Recorder::default()));
    let (from, to) = day();
    let report = engine_with(registry, two_games())
        .run(&[], from, to, &CancelToken::new())
        .await
        .unwrap();

    let flaky = report.result_for(StrategyId::Consensus).unwrap();
    assert_eq!(flaky.failed_units, 1);
    assert_eq!(flaky.games_evaluated, 1);
    assert_eq!(flaky.total_bets, 1);
    assert_eq!(flaky.losses, 1);

    let steady = report.result_for(StrategyId::SharpAction).unwrap();
    assert_eq!(steady.total_bets, 2);
    assert_eq!(steady.failed_units, 0);
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == "processor_failure" && e.game_id.as_deref() == Some("g1")));
}

#[tokio::test]
async fn every_default_strategy_reports_consistent_aggregates() {
    let config = AppConfig::default();
    let store = Arc::new(InMemoryStore::from_dataset(rich_dataset()).unwrap());
    let engine = BacktestEngine::new(
        Arc::new(StrategyRegistry::with_defaults(&config.strategies)),
        ConfidenceScorer::new(config.scoring),
        store.clone(),
        store,
        config.orchestrator.markets,
        config.backtest,
    );
    let (from, to) = day();
    let report = engine.run(&[], from, to, &CancelToken::new()).await.unwrap();

    assert_eq!(report.results.len(), StrategyId::ALL.len());
    for r in &report.results {
        assert!(r.wins <= r.total_bets);
        assert_eq!(r.wins + r.losses, r.total_bets);
        if r.total_bets > 0 {
            assert_eq!(r.win_rate, r.wins as f64 / r.total_bets as f64);
        } else {
            assert_eq!(r.sample_category, SampleCategory::Insufficient);
        }
    }
    assert!(report.summary_table().contains("sharp_action"));
}

#[tokio::test]
async fn cancelled_backtest_returns_partial_results() {
    let registry = StrategyRegistry::new();
    registry.register(StrategyId::SharpAction, Arc::new(Recorder::default()));
    let cancel = CancelToken::new();
    cancel.cancel();
    let (from, to) = day();

    let report = engine_with(registry, two_games())
        .run(&[], from, to, &cancel)
        .await
        .unwrap();

    assert!(report.partial);
    let r = report.result_for(StrategyId::SharpAction).unwrap();
    assert!(r.partial);
    assert_eq!(r.total_bets, 0);
}
