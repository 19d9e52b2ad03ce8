use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::{MarketType, Selection};
use crate::error::{Result, SharplineError};

/// A scheduled game and, once complete, its final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub outcome: Option<GameOutcome>,
}

impl Game {
    pub fn new(
        id: impl Into<String>,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Result<Self> {
        let game = Self {
            id: id.into(),
            home_team: home_team.into(),
            away_team: away_team.into(),
            start_time,
            outcome: None,
        };
        game.validate()?;
        Ok(game)
    }

    /// Attach the final score
    pub fn with_outcome(mut self, home_score: u32, away_score: u32) -> Self {
        self.outcome = Some(GameOutcome {
            home_score,
            away_score,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SharplineError::InvalidInput("game without id".into()));
        }
        if self.home_team.trim().is_empty() || self.away_team.trim().is_empty() {
            return Err(SharplineError::InvalidInput(format!(
                "game {} is missing a team",
                self.id
            )));
        }
        Ok(())
    }

    /// Games without an outcome cannot be scored
    pub fn is_backtestable(&self) -> bool {
        self.outcome.is_some()
    }

    /// Minutes from `at` until first pitch/tip-off (negative once started)
    pub fn minutes_to_start(&self, at: DateTime<Utc>) -> i64 {
        (self.start_time - at).num_minutes()
    }
}

/// Final score of a completed game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub home_score: u32,
    pub away_score: u32,
}

/// Result of a single wager once the outcome is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Win,
    Loss,
    Push,
}

impl GameOutcome {
    /// Winning side, `None` on a tie
    pub fn winner(&self) -> Option<Selection> {
        use std::cmp::Ordering;
        match self.home_score.cmp(&self.away_score) {
            Ordering::Greater => Some(Selection::Home),
            Ordering::Less => Some(Selection::Away),
            Ordering::Equal => None,
        }
    }

    pub fn home_win(&self) -> bool {
        self.winner() == Some(Selection::Home)
    }

    pub fn total_points(&self) -> Decimal {
        Decimal::from(self.home_score + self.away_score)
    }

    /// Over/under result against a total line, `None` on a push
    pub fn total_result(&self, line: Decimal) -> Option<Selection> {
        let total = self.total_points();
        if total > line {
            Some(Selection::Over)
        } else if total < line {
            Some(Selection::Under)
        } else {
            None
        }
    }

    /// Side that covered a home spread, `None` on a push
    pub fn spread_result(&self, home_line: Decimal) -> Option<Selection> {
        let margin = Decimal::from(self.home_score) - Decimal::from(self.away_score) + home_line;
        if margin > Decimal::ZERO {
            Some(Selection::Home)
        } else if margin < Decimal::ZERO {
            Some(Selection::Away)
        } else {
            None
        }
    }

    /// Grade a selection. `line` is the line from the selection's own
    /// perspective (the away spread for `Away`); required for spread and
    /// total markets.
    pub fn grade(
        &self,
        market: MarketType,
        selection: Selection,
        line: Option<Decimal>,
    ) -> Result<BetResult> {
        if !selection.belongs_to(market) {
            return Err(SharplineError::InvalidInput(format!(
                "selection {selection} does not belong to {market}"
            )));
        }

        let winner = match market {
            MarketType::Moneyline => self.winner(),
            MarketType::Total => {
                let line = line.ok_or_else(|| {
                    SharplineError::DataUnavailable("total line missing for grading".into())
                })?;
                self.total_result(line)
            }
            MarketType::Spread => {
                let line = line.ok_or_else(|| {
                    SharplineError::DataUnavailable("spread line missing for grading".into())
                })?;
                let home_line = match selection {
                    Selection::Away => -line,
                    _ => line,
                };
                self.spread_result(home_line)
            }
        };

        Ok(match winner {
            Some(w) if w == selection => BetResult::Win,
            Some(_) => BetResult::Loss,
            None => BetResult::Push,
        })
    }
}
