use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::odds::MAX_PRICE_MAGNITUDE;
use crate::error::{Result, SharplineError};

/// Betting market offered on a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Moneyline,
    Spread,
    Total,
}

impl MarketType {
    pub const ALL: [MarketType; 3] = [MarketType::Moneyline, MarketType::Spread, MarketType::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Moneyline => "moneyline",
            MarketType::Spread => "spread",
            MarketType::Total => "total",
        }
    }

    /// Selection the side-relative percentages and primary price refer to
    pub fn primary(&self) -> Selection {
        match self {
            MarketType::Moneyline | MarketType::Spread => Selection::Home,
            MarketType::Total => Selection::Over,
        }
    }

    /// Both selections of the market, primary first
    pub fn selections(&self) -> [Selection; 2] {
        let primary = self.primary();
        [primary, primary.opposite()]
    }

    /// Whether line moves are measured in points (spread/total) rather than
    /// American price cents (moneyline)
    pub fn uses_points(&self) -> bool {
        !matches!(self, MarketType::Moneyline)
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = SharplineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "moneyline" | "ml" | "h2h" => Ok(MarketType::Moneyline),
            "spread" | "runline" | "puckline" => Ok(MarketType::Spread),
            "total" | "totals" | "over_under" => Ok(MarketType::Total),
            other => Err(SharplineError::InvalidInput(format!(
                "unknown market type: {other}"
            ))),
        }
    }
}

/// Side of a market a signal recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Home,
    Away,
    Over,
    Under,
}

impl Selection {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Selection::Home => Selection::Away,
            Selection::Away => Selection::Home,
            Selection::Over => Selection::Under,
            Selection::Under => Selection::Over,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Selection::Home => "home",
            Selection::Away => "away",
            Selection::Over => "over",
            Selection::Under => "under",
        }
    }

    /// Whether the selection can be bet in the given market
    pub fn belongs_to(&self, market: MarketType) -> bool {
        match market {
            MarketType::Moneyline | MarketType::Spread => {
                matches!(self, Selection::Home | Selection::Away)
            }
            MarketType::Total => matches!(self, Selection::Over | Selection::Under),
        }
    }

    pub fn is_primary(&self, market: MarketType) -> bool {
        market.primary() == *self
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a single market for a single game at one sportsbook.
///
/// Percentages are relative to the market's primary selection (home for
/// moneyline/spread, over for totals). `line` is the home spread or the game
/// total; it is `None` for moneylines. Prices are American odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub game_id: String,
    pub market: MarketType,
    pub sportsbook: String,
    #[serde(default)]
    pub bet_pct: Option<f64>,
    #[serde(default)]
    pub money_pct: Option<f64>,
    #[serde(default)]
    pub line: Option<Decimal>,
    #[serde(default)]
    pub primary_price: Option<i32>,
    #[serde(default)]
    pub opposing_price: Option<i32>,
    #[serde(default)]
    pub bet_count: Option<u32>,
    pub observed_at: DateTime<Utc>,
}

impl OddsRecord {
    /// Start building a record; call `build()` to validate it
    pub fn builder(
        game_id: impl Into<String>,
        market: MarketType,
        sportsbook: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> OddsRecordBuilder {
        OddsRecordBuilder {
            record: OddsRecord {
                game_id: game_id.into(),
                market,
                sportsbook: sportsbook.into(),
                bet_pct: None,
                money_pct: None,
                line: None,
                primary_price: None,
                opposing_price: None,
                bet_count: None,
                observed_at,
            },
        }
    }

    /// Check structural validity
    pub fn validate(&self) -> Result<()> {
        if self.game_id.trim().is_empty() {
            return Err(SharplineError::InvalidInput("odds record without game id".into()));
        }
        if self.sportsbook.trim().is_empty() {
            return Err(SharplineError::InvalidInput(format!(
                "odds record for game {} without sportsbook",
                self.game_id
            )));
        }
        for (label, pct) in [("bet_pct", self.bet_pct), ("money_pct", self.money_pct)] {
            if let Some(p) = pct {
                if !p.is_finite() || !(0.0..=100.0).contains(&p) {
                    return Err(SharplineError::InvalidInput(format!(
                        "{label} {p} out of range for game {}",
                        self.game_id
                    )));
                }
            }
        }
        for price in [self.primary_price, self.opposing_price].into_iter().flatten() {
            if (price > -100 && price < 100) || price.unsigned_abs() > MAX_PRICE_MAGNITUDE {
                return Err(SharplineError::InvalidInput(format!(
                    "American price {price} is not valid for game {}",
                    self.game_id
                )));
            }
        }
        Ok(())
    }

    /// Ticket percentage backing a selection
    pub fn bet_pct_for(&self, selection: Selection) -> Option<f64> {
        self.side_relative(self.bet_pct, selection)
    }

    /// Handle percentage backing a selection
    pub fn money_pct_for(&self, selection: Selection) -> Option<f64> {
        self.side_relative(self.money_pct, selection)
    }

    /// Money% minus bet% on the primary selection. Positive means the money
    /// leans to the primary selection harder than the tickets do.
    pub fn differential(&self) -> Option<f64> {
        Some(self.money_pct? - self.bet_pct?)
    }

    /// American price for a selection
    pub fn price_for(&self, selection: Selection) -> Option<i32> {
        if !selection.belongs_to(self.market) {
            return None;
        }
        if selection.is_primary(self.market) {
            self.primary_price
        } else {
            self.opposing_price
        }
    }

    /// Line from the perspective of a selection (spread negated for away)
    pub fn line_for(&self, selection: Selection) -> Option<Decimal> {
        let line = self.line?;
        match (self.market, selection) {
            (MarketType::Spread, Selection::Away) => Some(-line),
            (MarketType::Moneyline, _) => None,
            _ => Some(line),
        }
    }

    /// Total tickets observed, when the book reports it
    pub fn volume(&self) -> Option<u32> {
        self.bet_count
    }

    fn side_relative(&self, pct: Option<f64>, selection: Selection) -> Option<f64> {
        if !selection.belongs_to(self.market) {
            return None;
        }
        let pct = pct?;
        if selection.is_primary(self.market) {
            Some(pct)
        } else {
            Some(100.0 - pct)
        }
    }
}

/// Builder for validated odds records
#[derive(Debug, Clone)]
pub struct OddsRecordBuilder {
    record: OddsRecord,
}

impl OddsRecordBuilder {
    pub fn percentages(mut self, bet_pct: f64, money_pct: f64) -> Self {
        self.record.bet_pct = Some(bet_pct);
        self.record.money_pct = Some(money_pct);
        self
    }

    pub fn bet_pct(mut self, bet_pct: f64) -> Self {
        self.record.bet_pct = Some(bet_pct);
        self
    }

    pub fn money_pct(mut self, money_pct: f64) -> Self {
        self.record.money_pct = Some(money_pct);
        self
    }

    pub fn line(mut self, line: Decimal) -> Self {
        self.record.line = Some(line);
        self
    }

    pub fn prices(mut self, primary: i32, opposing: i32) -> Self {
        self.record.primary_price = Some(primary);
        self.record.opposing_price = Some(opposing);
        self
    }

    pub fn bet_count(mut self, count: u32) -> Self {
        self.record.bet_count = Some(count);
        self
    }

    pub fn build(self) -> Result<OddsRecord> {
        self.record.validate()?;
        Ok(self.record)
    }
}

/// Sort records chronologically; ties broken by sportsbook for stable output
pub fn sort_chronologically(records: &mut [OddsRecord]) {
    records.sort_by(|a, b| {
        a.observed_at
            .cmp(&b.observed_at)
            .then_with(|| a.sportsbook.cmp(&b.sportsbook))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_side_relative_percentages() {
        let rec = OddsRecord::builder("g1", MarketType::Moneyline, "pinnacle", ts())
            .percentages(70.0, 45.0)
            .build()
            .unwrap();

        assert_eq!(rec.bet_pct_for(Selection::Home), Some(70.0));
        assert_eq!(rec.bet_pct_for(Selection::Away), Some(30.0));
        assert_eq!(rec.money_pct_for(Selection::Away), Some(55.0));
        assert_eq!(rec.bet_pct_for(Selection::Over), None);
        assert_eq!(rec.differential(), Some(-25.0));
    }

    #[test]
    fn test_spread_line_negated_for_away() {
        let rec = OddsRecord::builder("g1", MarketType::Spread, "circa", ts())
            .line(dec!(-1.5))
            .prices(150, -170)
            .build()
            .unwrap();

        assert_eq!(rec.line_for(Selection::Home), Some(dec!(-1.5)));
        assert_eq!(rec.line_for(Selection::Away), Some(dec!(1.5)));
        assert_eq!(rec.price_for(Selection::Away), Some(-170));
    }

    #[test]
    fn test_invalid_records_rejected() {
        let bad_pct = OddsRecord::builder("g1", MarketType::Total, "dk", ts())
            .percentages(101.0, 50.0)
            .build();
        assert!(matches!(bad_pct, Err(SharplineError::InvalidInput(_))));

        let bad_price = OddsRecord::builder("g1", MarketType::Total, "dk", ts())
            .prices(-50, 120)
            .build();
        assert!(bad_price.is_err());

        for price in [i32::MIN, -100_001, 100_001, i32::MAX] {
            let huge = OddsRecord::builder("g1", MarketType::Moneyline, "dk", ts())
                .prices(price, 150)
                .build();
            assert!(matches!(huge, Err(SharplineError::InvalidInput(_))), "{price}");
        }
        assert!(OddsRecord::builder("g1", MarketType::Moneyline, "dk", ts())
            .prices(-100_000, 100_000)
            .build()
            .is_ok());

        let no_book = OddsRecord::builder("g1", MarketType::Total, " ", ts()).build();
        assert!(no_book.is_err());
    }

    #[test]
    fn test_market_type_parsing() {
        assert_eq!("ML".parse::<MarketType>().unwrap(), MarketType::Moneyline);
        assert_eq!("totals".parse::<MarketType>().unwrap(), MarketType::Total);
        assert!("props".parse::<MarketType>().is_err());
        assert_eq!(MarketType::Total.selections(), [Selection::Over, Selection::Under]);
    }
}
