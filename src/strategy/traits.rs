//! Core processor trait and the point-in-time view processors read from
//!
//! A processor never filters by time itself. Whoever builds a
//! [`GameContext`] guarantees that every record was observed at or before the
//! cutoff; [`GameContext::new`] rejects input that breaks this.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::{sort_chronologically, Game, MarketType, OddsRecord, Signal, StrategyId};
use crate::error::{Result, SharplineError};

// ============================================================================
// SignalProcessor
// ============================================================================

/// A betting heuristic that turns a game's market history into signals.
///
/// Implementations are pure: no I/O, no clock reads, no interior state that
/// changes between calls. The same context always yields the same signals.
pub trait SignalProcessor: Send + Sync {
    /// Strategy identifier
    fn id(&self) -> StrategyId;

    /// Human-readable name
    fn name(&self) -> &str;

    /// One-line description of the heuristic
    fn description(&self) -> &str;

    /// Emit zero or more signals for the game. Missing optional data means
    /// "no signal", never an error.
    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>>;
}

// ============================================================================
// GameContext
// ============================================================================

/// A game plus every odds record available at `cutoff`, oldest first
#[derive(Debug, Clone)]
pub struct GameContext {
    game: Game,
    records: Vec<OddsRecord>,
    cutoff: DateTime<Utc>,
}

impl GameContext {
    pub fn new(game: Game, mut records: Vec<OddsRecord>, cutoff: DateTime<Utc>) -> Result<Self> {
        game.validate()?;
        for rec in &records {
            if rec.game_id != game.id {
                return Err(SharplineError::InvalidInput(format!(
                    "record for game {} passed with game {}",
                    rec.game_id, game.id
                )));
            }
            if rec.observed_at > cutoff {
                return Err(SharplineError::InvalidInput(format!(
                    "record from {} at {} is after cutoff {}",
                    rec.sportsbook, rec.observed_at, cutoff
                )));
            }
        }
        sort_chronologically(&mut records);
        Ok(Self {
            game,
            records,
            cutoff,
        })
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn records(&self) -> &[OddsRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Markets with at least one record, in canonical order
    pub fn markets(&self) -> Vec<MarketType> {
        MarketType::ALL
            .into_iter()
            .filter(|m| self.records.iter().any(|r| r.market == *m))
            .collect()
    }

    pub fn market_records(&self, market: MarketType) -> impl Iterator<Item = &OddsRecord> {
        self.records.iter().filter(move |r| r.market == market)
    }

    /// Chronological history per sportsbook
    pub fn history_by_book(&self, market: MarketType) -> BTreeMap<&str, Vec<&OddsRecord>> {
        let mut by_book: BTreeMap<&str, Vec<&OddsRecord>> = BTreeMap::new();
        for rec in self.market_records(market) {
            by_book.entry(rec.sportsbook.as_str()).or_default().push(rec);
        }
        by_book
    }

    /// Most recent record per sportsbook, ordered by book name
    pub fn latest_by_book(&self, market: MarketType) -> Vec<&OddsRecord> {
        self.history_by_book(market)
            .into_values()
            .filter_map(|history| history.last().copied())
            .collect()
    }

    /// Timestamp of the newest record in a market
    pub fn latest_observation(&self, market: MarketType) -> Option<DateTime<Utc>> {
        self.market_records(market).map(|r| r.observed_at).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn game() -> Game {
        Game::new("g1", "NYY", "BOS", Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap()).unwrap()
    }

    fn rec(book: &str, market: MarketType, minutes_before: i64) -> OddsRecord {
        let start = game().start_time;
        OddsRecord::builder("g1", market, book, start - Duration::minutes(minutes_before))
            .percentages(60.0, 50.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_records_after_cutoff() {
        let g = game();
        let cutoff = g.start_time - Duration::hours(1);
        let records = vec![rec("pinnacle", MarketType::Moneyline, 30)];
        let err = GameContext::new(g, records, cutoff).unwrap_err();
        assert!(matches!(err, SharplineError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_foreign_game_records() {
        let g = game();
        let mut other = rec("pinnacle", MarketType::Moneyline, 90);
        other.game_id = "g2".into();
        assert!(GameContext::new(g.clone(), vec![other], g.start_time).is_err());
    }

    #[test]
    fn test_latest_by_book_and_markets() {
        let g = game();
        let records = vec![
            rec("pinnacle", MarketType::Moneyline, 60),
            rec("dk", MarketType::Moneyline, 200),
            rec("pinnacle", MarketType::Moneyline, 120),
            rec("dk", MarketType::Total, 50),
        ];
        let ctx = GameContext::new(g.clone(), records, g.start_time).unwrap();

        assert_eq!(ctx.markets(), vec![MarketType::Moneyline, MarketType::Total]);
        let latest = ctx.latest_by_book(MarketType::Moneyline);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].sportsbook, "dk");
        assert_eq!(latest[1].observed_at, g.start_time - Duration::minutes(60));
        assert_eq!(
            ctx.latest_observation(MarketType::Moneyline),
            Some(g.start_time - Duration::minutes(60))
        );
    }
}
