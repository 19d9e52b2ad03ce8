use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{ConfidenceLevel, MarketType, StrategyId, TimingBucket};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub strategies: StrategiesConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================================
// Processor thresholds
// ============================================================================

/// Per-processor thresholds, injected at construction time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    /// Strategies left out of the default registry
    pub disabled: Vec<StrategyId>,
    pub sharp_action: SharpActionConfig,
    pub line_movement: LineMovementConfig,
    pub consensus: ConsensusConfig,
    pub public_fade: PublicFadeConfig,
    pub late_flip: LateFlipConfig,
    pub underdog_value: UnderdogValueConfig,
    pub book_conflict: BookConflictConfig,
    pub timing_based: TimingBasedConfig,
    pub hybrid_sharp: HybridSharpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpActionConfig {
    /// Minimum |money% - bet%| on a single book
    pub min_differential: f64,
    /// Books that must clear the threshold on the same side
    pub min_books: usize,
    pub moderate_differential: f64,
    pub strong_differential: f64,
    pub very_strong_differential: f64,
    /// Differential at which base confidence saturates at 1.0
    pub saturation_differential: f64,
}

impl Default for SharpActionConfig {
    fn default() -> Self {
        Self {
            min_differential: 15.0,
            min_books: 1,
            moderate_differential: 20.0,
            strong_differential: 25.0,
            very_strong_differential: 30.0,
            saturation_differential: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineMovementConfig {
    /// Independent books that must move together for steam
    pub steam_min_books: usize,
    /// Minimum move in points for spread/total markets
    pub steam_min_points: f64,
    /// Minimum move in price cents for moneylines
    pub steam_min_cents: i32,
    pub steam_window_minutes: i64,
    pub detect_reverse: bool,
    pub rlm_min_points: f64,
    pub rlm_min_cents: i32,
    /// Ticket share that defines the public side for reverse movement
    pub rlm_public_threshold: f64,
}

impl Default for LineMovementConfig {
    fn default() -> Self {
        Self {
            steam_min_books: 3,
            steam_min_points: 0.5,
            steam_min_cents: 10,
            steam_window_minutes: 30,
            detect_reverse: true,
            rlm_min_points: 0.5,
            rlm_min_cents: 10,
            rlm_public_threshold: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    Follow,
    Fade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub heavy_money_pct: f64,
    pub heavy_bet_pct: f64,
    pub mixed_money_pct: f64,
    pub mixed_bet_pct: f64,
    pub mode: ConsensusMode,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            heavy_money_pct: 90.0,
            heavy_bet_pct: 90.0,
            mixed_money_pct: 80.0,
            mixed_bet_pct: 60.0,
            mode: ConsensusMode::Follow,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicFadeConfig {
    /// Average ticket share across books that marks a public side
    pub public_threshold: f64,
    pub min_books: usize,
    /// Maximum book-to-book standard deviation of the ticket share
    pub max_book_stddev: f64,
}

impl Default for PublicFadeConfig {
    fn default() -> Self {
        Self {
            public_threshold: 65.0,
            min_books: 2,
            max_book_stddev: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LateFlipConfig {
    pub late_window_hours: i64,
    pub baseline_window_hours: i64,
    /// Minimum swing in bet% or money% between baseline and late
    pub min_swing: f64,
}

impl Default for LateFlipConfig {
    fn default() -> Self {
        Self {
            late_window_hours: 3,
            baseline_window_hours: 24,
            min_swing: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderdogValueConfig {
    pub public_favorite_threshold: f64,
    pub min_dog_price: i32,
    pub max_dog_price: i32,
    pub require_money_support: bool,
    /// Money% on the dog must exceed its bet% by this much
    pub min_dog_money_support: f64,
}

impl Default for UnderdogValueConfig {
    fn default() -> Self {
        Self {
            public_favorite_threshold: 65.0,
            min_dog_price: 120,
            max_dog_price: 300,
            require_money_support: false,
            min_dog_money_support: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConflictConfig {
    pub min_books: usize,
    /// Spread between highest and lowest line, in points
    pub min_line_spread: f64,
    /// Spread in no-vig probability between books
    pub min_prob_spread: f64,
}

impl Default for BookConflictConfig {
    fn default() -> Self {
        Self {
            min_books: 2,
            min_line_spread: 1.0,
            min_prob_spread: 0.04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingBasedConfig {
    /// Differential required per bucket, earliest bucket first
    pub bucket_thresholds: Vec<f64>,
}

impl Default for TimingBasedConfig {
    fn default() -> Self {
        Self {
            bucket_thresholds: vec![30.0, 27.0, 25.0, 22.0, 20.0, 18.0, 15.0, 13.0, 12.0],
        }
    }
}

impl TimingBasedConfig {
    pub fn threshold_for(&self, bucket: TimingBucket) -> Option<f64> {
        let idx = TimingBucket::ALL.iter().position(|b| *b == bucket)?;
        self.bucket_thresholds.get(idx).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSharpConfig {
    pub min_differential: f64,
    pub strong_differential: f64,
    pub perfect_differential: f64,
    /// Minimum consensus line move (points) to count as confirmation
    pub min_line_move_points: f64,
    pub min_line_move_cents: i32,
}

impl Default for HybridSharpConfig {
    fn default() -> Self {
        Self {
            min_differential: 15.0,
            strong_differential: 20.0,
            perfect_differential: 25.0,
            min_line_move_points: 0.5,
            min_line_move_cents: 10,
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeTier {
    pub min_bets: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Credibility weight per sportsbook (lowercase name)
    pub book_weights: BTreeMap<String, f64>,
    pub default_book_weight: f64,
    /// Weight that maps to a 1.0x modifier
    pub credibility_baseline: f64,
    /// Multiplier per timing bucket, earliest bucket first
    pub timing_multipliers: Vec<f64>,
    /// Checked top-down; first tier whose minimum is met applies
    pub volume_tiers: Vec<VolumeTier>,
    pub unknown_volume_multiplier: f64,
    pub strategy_modifiers: BTreeMap<StrategyId, f64>,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let book_weights = [
            ("pinnacle", 4.0),
            ("circa", 3.5),
            ("bookmaker", 3.5),
            ("betcris", 3.0),
            ("bet365", 2.5),
            ("draftkings", 2.0),
            ("fanduel", 2.0),
            ("betmgm", 1.5),
            ("caesars", 1.5),
            ("pointsbet", 1.0),
            ("betrivers", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            book_weights,
            default_book_weight: 1.5,
            credibility_baseline: 2.5,
            timing_multipliers: vec![0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3, 1.4, 1.5],
            volume_tiers: vec![
                VolumeTier { min_bets: 1000, multiplier: 1.3 },
                VolumeTier { min_bets: 500, multiplier: 1.1 },
                VolumeTier { min_bets: 200, multiplier: 1.0 },
                VolumeTier { min_bets: 0, multiplier: 0.8 },
            ],
            unknown_volume_multiplier: 1.0,
            strategy_modifiers: BTreeMap::from([
                (StrategyId::HybridSharp, 1.1),
                (StrategyId::BookConflict, 0.9),
            ]),
            high_threshold: 0.80,
            medium_threshold: 0.60,
        }
    }
}

impl ScoringConfig {
    /// Every modifier fixed at 1.0, so final confidence equals base confidence
    pub fn neutral() -> Self {
        Self {
            book_weights: BTreeMap::new(),
            default_book_weight: 1.0,
            credibility_baseline: 1.0,
            timing_multipliers: vec![1.0; TimingBucket::ALL.len()],
            volume_tiers: Vec::new(),
            unknown_volume_multiplier: 1.0,
            strategy_modifiers: BTreeMap::new(),
            ..Self::default()
        }
    }

    pub fn level_for(&self, confidence: f64) -> ConfidenceLevel {
        if confidence >= self.high_threshold {
            ConfidenceLevel::High
        } else if confidence >= self.medium_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

// ============================================================================
// Orchestration and backtesting
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum (strategy, game) units in flight
    pub max_concurrency: usize,
    pub markets: Vec<MarketType>,
    /// Drop signals below this level after aggregation
    pub min_level: Option<ConfidenceLevel>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            markets: MarketType::ALL.to_vec(),
            min_level: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Records must be at least this old at game start
    pub min_lag_secs: i64,
    /// Records older than this at game start are stale
    pub max_staleness_minutes: i64,
    pub batch_days: i64,
    /// American price used when a signal carries none
    pub assumed_price: i32,
    pub use_actual_price: bool,
    /// Signals with lower final confidence are not bet
    pub min_confidence: f64,
    pub max_concurrency: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_lag_secs: 30,
            max_staleness_minutes: 45,
            batch_days: 1,
            assumed_price: crate::domain::odds::STANDARD_PRICE,
            use_actual_price: true,
            min_confidence: 0.0,
            max_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: Option<String>,
    /// Maximum connections in pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for daily rolling log files
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SHARPLINE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // SHARPLINE_BACKTEST__MIN_LAG_SECS, SHARPLINE_DATABASE__URL, ...
            .add_source(
                Environment::with_prefix("SHARPLINE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let s = &self.strategies;

        let pct_fields = [
            ("sharp_action.min_differential", s.sharp_action.min_differential),
            ("consensus.heavy_money_pct", s.consensus.heavy_money_pct),
            ("consensus.heavy_bet_pct", s.consensus.heavy_bet_pct),
            ("consensus.mixed_money_pct", s.consensus.mixed_money_pct),
            ("consensus.mixed_bet_pct", s.consensus.mixed_bet_pct),
            ("public_fade.public_threshold", s.public_fade.public_threshold),
            ("late_flip.min_swing", s.late_flip.min_swing),
            ("underdog_value.public_favorite_threshold", s.underdog_value.public_favorite_threshold),
            ("line_movement.rlm_public_threshold", s.line_movement.rlm_public_threshold),
            ("hybrid_sharp.min_differential", s.hybrid_sharp.min_differential),
        ];
        for (name, value) in pct_fields {
            if !(0.0..=100.0).contains(&value) {
                errors.push(format!("strategies.{name} must be between 0 and 100"));
            }
        }

        let sharp = &s.sharp_action;
        if !(sharp.min_differential <= sharp.moderate_differential
            && sharp.moderate_differential <= sharp.strong_differential
            && sharp.strong_differential <= sharp.very_strong_differential)
        {
            errors.push("sharp_action strength tiers must be ascending".to_string());
        }
        if sharp.saturation_differential <= 0.0 {
            errors.push("sharp_action.saturation_differential must be positive".to_string());
        }
        if sharp.min_books == 0 {
            errors.push("sharp_action.min_books must be at least 1".to_string());
        }

        if s.line_movement.steam_min_books < 2 {
            errors.push("line_movement.steam_min_books must be at least 2".to_string());
        }
        if s.line_movement.steam_window_minutes <= 0 {
            errors.push("line_movement.steam_window_minutes must be positive".to_string());
        }

        if s.late_flip.late_window_hours >= s.late_flip.baseline_window_hours {
            errors.push("late_flip.late_window_hours must be less than baseline_window_hours".to_string());
        }

        if s.underdog_value.min_dog_price < 100
            || s.underdog_value.min_dog_price > s.underdog_value.max_dog_price
        {
            errors.push("underdog_value price band must be positive and ordered".to_string());
        }

        if s.book_conflict.min_books < 2 {
            errors.push("book_conflict.min_books must be at least 2".to_string());
        }

        if s.timing_based.bucket_thresholds.len() != TimingBucket::ALL.len() {
            errors.push(format!(
                "timing_based.bucket_thresholds needs {} entries",
                TimingBucket::ALL.len()
            ));
        }

        let scoring = &self.scoring;
        if scoring.timing_multipliers.len() != TimingBucket::ALL.len() {
            errors.push(format!(
                "scoring.timing_multipliers needs {} entries",
                TimingBucket::ALL.len()
            ));
        }
        if scoring.timing_multipliers.windows(2).any(|w| w[0] > w[1]) {
            errors.push("scoring.timing_multipliers must not decrease toward game time".to_string());
        }
        if scoring.credibility_baseline <= 0.0 {
            errors.push("scoring.credibility_baseline must be positive".to_string());
        }
        if scoring
            .book_weights
            .values()
            .chain(std::iter::once(&scoring.default_book_weight))
            .any(|w| *w <= 0.0)
        {
            errors.push("scoring book weights must be positive".to_string());
        }
        if !(0.0 < scoring.medium_threshold
            && scoring.medium_threshold < scoring.high_threshold
            && scoring.high_threshold <= 1.0)
        {
            errors.push("scoring thresholds must satisfy 0 < medium < high <= 1".to_string());
        }

        if self.orchestrator.max_concurrency == 0 {
            errors.push("orchestrator.max_concurrency must be at least 1".to_string());
        }
        if self.orchestrator.markets.is_empty() {
            errors.push("orchestrator.markets must not be empty".to_string());
        }

        let bt = &self.backtest;
        if bt.min_lag_secs < 0 {
            errors.push("backtest.min_lag_secs must not be negative".to_string());
        }
        if bt.min_lag_secs >= bt.max_staleness_minutes * 60 {
            errors.push("backtest.min_lag_secs must be less than max_staleness_minutes".to_string());
        }
        if bt.batch_days < 1 {
            errors.push("backtest.batch_days must be at least 1".to_string());
        }
        if (bt.assumed_price > -100 && bt.assumed_price < 100)
            || bt.assumed_price.unsigned_abs() > crate::domain::odds::MAX_PRICE_MAGNITUDE
        {
            errors.push("backtest.assumed_price is not a valid American price".to_string());
        }
        if !(0.0..=1.0).contains(&bt.min_confidence) {
            errors.push("backtest.min_confidence must be between 0 and 1".to_string());
        }
        if bt.max_concurrency == 0 {
            errors.push("backtest.max_concurrency must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut cfg = AppConfig::default();
        cfg.backtest.min_lag_secs = 3600;
        cfg.orchestrator.max_concurrency = 0;
        cfg.scoring.timing_multipliers.reverse();

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("min_lag_secs")));
    }

    #[test]
    fn test_level_thresholds() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.level_for(0.80), ConfidenceLevel::High);
        assert_eq!(scoring.level_for(0.79), ConfidenceLevel::Medium);
        assert_eq!(scoring.level_for(0.60), ConfidenceLevel::Medium);
        assert_eq!(scoring.level_for(0.59), ConfidenceLevel::Low);
    }

    #[test]
    fn test_timing_threshold_lookup() {
        let cfg = TimingBasedConfig::default();
        assert_eq!(cfg.threshold_for(TimingBucket::VeryEarly), Some(30.0));
        assert_eq!(cfg.threshold_for(TimingBucket::UltraLate), Some(12.0));
    }

    #[test]
    fn test_load_from_toml_overrides() {
        let dir = std::env::temp_dir().join(format!("sharpline-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[strategies.sharp_action]\nmin_differential = 22.0\n\n[backtest]\nmax_staleness_minutes = 90\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&dir).unwrap();
        assert_eq!(cfg.strategies.sharp_action.min_differential, 22.0);
        assert_eq!(cfg.strategies.sharp_action.min_books, 1);
        assert_eq!(cfg.backtest.max_staleness_minutes, 90);
        assert_eq!(cfg.backtest.min_lag_secs, 30);

        std::fs::remove_dir_all(&dir).ok();
    }
}
