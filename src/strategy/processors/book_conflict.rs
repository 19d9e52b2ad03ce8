//! Book conflict: sportsbooks disagreeing on the same market
//!
//! Lines are compared first (spread/total). When every book hangs the same
//! line, or for moneylines, the vig-free probability of the primary side is
//! compared instead. The book furthest from the median is the outlier and
//! the side it prices most generously is recommended there.

use rust_decimal::prelude::ToPrimitive;

use crate::config::BookConflictConfig;
use crate::domain::odds::no_vig_probability;
use crate::domain::{MarketType, OddsRecord, Selection, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, median};

struct Outlier<'a> {
    record: &'a OddsRecord,
    selection: Selection,
    spread: f64,
    threshold: f64,
    kind: &'static str,
}

/// Book furthest from the median value; ties go to the first book by name
fn furthest<'a>(values: &[(&'a OddsRecord, f64)]) -> Option<(&'a OddsRecord, f64, f64)> {
    let nums: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
    let mid = median(&nums)?;
    let mut best: Option<(&'a OddsRecord, f64, f64)> = None;
    for &(rec, value) in values {
        let distance = (value - mid).abs();
        if best.map_or(true, |(_, _, d)| distance > d) {
            best = Some((rec, value, distance));
        }
    }
    best.map(|(rec, value, _)| (rec, value, mid))
}

fn spread_of(values: &[(&OddsRecord, f64)]) -> f64 {
    let max = values.iter().map(|(_, v)| *v).fold(f64::MIN, f64::max);
    let min = values.iter().map(|(_, v)| *v).fold(f64::MAX, f64::min);
    max - min
}

/// Book conflict processor
pub struct BookConflictProcessor {
    config: BookConflictConfig,
}

impl BookConflictProcessor {
    pub fn new(config: BookConflictConfig) -> Self {
        Self { config }
    }

    fn line_outlier<'a>(&self, market: MarketType, latest: &[&'a OddsRecord]) -> Option<Outlier<'a>> {
        if !market.uses_points() {
            return None;
        }
        let lines: Vec<(&OddsRecord, f64)> = latest
            .iter()
            .filter_map(|r| r.line.and_then(|l| l.to_f64()).map(|l| (*r, l)))
            .collect();
        if lines.len() < self.config.min_books {
            return None;
        }
        let spread = spread_of(&lines);
        if spread < self.config.min_line_spread {
            return None;
        }
        let (record, value, mid) = furthest(&lines)?;
        // A higher home spread gives home more points; a higher total favours the under
        let selection = match (market, value > mid) {
            (MarketType::Spread, true) => Selection::Home,
            (MarketType::Spread, false) => Selection::Away,
            (_, true) => Selection::Under,
            (_, false) => Selection::Over,
        };
        Some(Outlier {
            record,
            selection,
            spread,
            threshold: self.config.min_line_spread,
            kind: "line",
        })
    }

    fn price_outlier<'a>(&self, market: MarketType, latest: &[&'a OddsRecord]) -> Option<Outlier<'a>> {
        let priced: Vec<&OddsRecord> = latest
            .iter()
            .copied()
            .filter(|r| r.primary_price.is_some() && r.opposing_price.is_some())
            .collect();
        if market.uses_points() {
            // Prices are only comparable at the same number
            let first_line = priced.first()?.line;
            if priced.iter().any(|r| r.line != first_line) {
                return None;
            }
        }
        let probs: Vec<(&OddsRecord, f64)> = priced
            .iter()
            .filter_map(|r| Some((*r, no_vig_probability(r.primary_price?, r.opposing_price?))))
            .collect();
        if probs.len() < self.config.min_books {
            return None;
        }
        let spread = spread_of(&probs);
        if spread < self.config.min_prob_spread {
            return None;
        }
        let (record, value, mid) = furthest(&probs)?;
        // The outlier rates the primary side lower than the field: it pays more there
        let selection = if value < mid {
            market.primary()
        } else {
            market.primary().opposite()
        };
        Some(Outlier {
            record,
            selection,
            spread,
            threshold: self.config.min_prob_spread,
            kind: "price",
        })
    }

    fn analyze(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let latest = ctx.latest_by_book(market);
        if latest.len() < self.config.min_books {
            return Ok(None);
        }
        let Some(outlier) = self
            .line_outlier(market, &latest)
            .or_else(|| self.price_outlier(market, &latest))
        else {
            return Ok(None);
        };

        let ratio = outlier.spread / outlier.threshold;
        let confidence = clamp_confidence(0.5 + 0.3 * ((ratio - 1.0) / 2.0).min(1.0));
        let book = &outlier.record.sportsbook;

        Ok(Some(
            Signal::new(self.id(), &ctx.game().id, market, outlier.selection, confidence, ctx.cutoff())?
                .with_line(outlier.record.line_for(outlier.selection))
                .with_price(outlier.record.price_for(outlier.selection))
                .with_strength(SignalStrength::from_ratio(ratio))
                .with_reason(format!(
                    "{} disagreement of {:.2} across {} books; {} best at {}",
                    outlier.kind,
                    outlier.spread,
                    latest.len(),
                    outlier.selection,
                    book
                ))
                .with_detail("conflict", outlier.kind)
                .with_detail("outlier_book", book)
                .with_evidence(latest.into_iter().cloned().collect()),
        ))
    }
}

impl Default for BookConflictProcessor {
    fn default() -> Self {
        Self::new(BookConflictConfig::default())
    }
}

impl SignalProcessor for BookConflictProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::BookConflict
    }

    fn name(&self) -> &str {
        "Book Conflict"
    }

    fn description(&self) -> &str {
        "Targets the outlier book when sportsbooks disagree beyond normal vig"
    }

    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for market in ctx.markets() {
            if let Some(signal) = self.analyze(ctx, market)? {
                signals.push(signal);
            }
        }
        Ok(signals)
    }
}
