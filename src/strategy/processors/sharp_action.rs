//! Sharp action: money% diverging from ticket%
//!
//! When a minority of tickets carries a majority of the handle, larger
//! (professional) wagers are on that side. The processor reads the latest
//! record per book and recommends the side the money favours.

use std::cmp::Ordering;

use crate::config::SharpActionConfig;
use crate::domain::{MarketType, OddsRecord, Selection, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, mean};

/// Latest per-book differential on one side of a market
#[derive(Debug, Clone)]
pub(crate) struct SharpReading<'a> {
    pub selection: Selection,
    /// Mean |money% - bet%| over the qualifying books
    pub differential: f64,
    pub books: Vec<&'a OddsRecord>,
}

/// Find the side the money leans to, using the latest record of each book.
///
/// Books at or above `min_differential` vote for their money side; the side
/// with more qualifying books wins, then the larger mean differential. An
/// exact split yields nothing.
pub(crate) fn read_sharp<'a>(
    ctx: &'a GameContext,
    market: MarketType,
    min_differential: f64,
    min_books: usize,
) -> Option<SharpReading<'a>> {
    let mut per_side: [(Selection, Vec<(f64, &OddsRecord)>); 2] = [
        (market.primary(), Vec::new()),
        (market.primary().opposite(), Vec::new()),
    ];

    for rec in ctx.latest_by_book(market) {
        let Some(diff) = rec.differential() else {
            continue;
        };
        if diff.abs() < min_differential || diff == 0.0 {
            continue;
        }
        let slot = if diff > 0.0 { 0 } else { 1 };
        per_side[slot].1.push((diff.abs(), rec));
    }

    let summarize = |entries: &Vec<(f64, &OddsRecord)>| {
        let diffs: Vec<f64> = entries.iter().map(|(d, _)| *d).collect();
        (entries.len(), mean(&diffs).unwrap_or(0.0))
    };
    let (primary_books, primary_diff) = summarize(&per_side[0].1);
    let (other_books, other_diff) = summarize(&per_side[1].1);

    let winner = match primary_books.cmp(&other_books).then_with(|| {
        primary_diff
            .partial_cmp(&other_diff)
            .unwrap_or(Ordering::Equal)
    }) {
        Ordering::Greater => 0,
        Ordering::Less => 1,
        Ordering::Equal => return None,
    };

    let (selection, entries) = &per_side[winner];
    if entries.len() < min_books.max(1) {
        return None;
    }
    let (_, differential) = summarize(entries);

    Some(SharpReading {
        selection: *selection,
        differential,
        books: entries.iter().map(|(_, r)| *r).collect(),
    })
}

/// Sharp-money processor
pub struct SharpActionProcessor {
    config: SharpActionConfig,
}

impl SharpActionProcessor {
    pub fn new(config: SharpActionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SharpActionConfig {
        &self.config
    }

    fn strength(&self, differential: f64) -> SignalStrength {
        let c = &self.config;
        if differential >= c.very_strong_differential {
            SignalStrength::VeryStrong
        } else if differential >= c.strong_differential {
            SignalStrength::Strong
        } else if differential >= c.moderate_differential {
            SignalStrength::Moderate
        } else {
            SignalStrength::Weak
        }
    }
}

impl Default for SharpActionProcessor {
    fn default() -> Self {
        Self::new(SharpActionConfig::default())
    }
}

impl SignalProcessor for SharpActionProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::SharpAction
    }

    fn name(&self) -> &str {
        "Sharp Action"
    }

    fn description(&self) -> &str {
        "Follows the side where money% exceeds ticket% by a configured differential"
    }

    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        for market in ctx.markets() {
            let Some(reading) =
                read_sharp(ctx, market, self.config.min_differential, self.config.min_books)
            else {
                continue;
            };

            let confidence = clamp_confidence(
                0.5 + 0.5 * (reading.differential / self.config.saturation_differential).min(1.0),
            );
            let books = reading.books.len();
            let signal = Signal::new(
                self.id(),
                &ctx.game().id,
                market,
                reading.selection,
                confidence,
                ctx.cutoff(),
            )?
            .with_strength(self.strength(reading.differential))
            .with_reason(format!(
                "money leads tickets by {:.1} pts on {} at {} book(s)",
                reading.differential, reading.selection, books
            ))
            .with_detail("differential", format!("{:.1}", reading.differential))
            .with_detail("books", books)
            .with_evidence(reading.books.into_iter().cloned().collect());

            signals.push(signal);
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::processors::fixtures::{ctx, pct};

    fn processor(min_differential: f64) -> SharpActionProcessor {
        SharpActionProcessor::new(SharpActionConfig {
            min_differential,
            ..SharpActionConfig::default()
        })
    }

    #[test]
    fn test_differential_below_threshold_emits_nothing() {
        // 80% of tickets but only 55% of money on home: 25 pts toward away
        let c = ctx(vec![pct(MarketType::Moneyline, "pinnacle", 60, 80.0, 55.0)]);
        assert!(processor(30.0).generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_recommends_money_side() {
        let c = ctx(vec![pct(MarketType::Moneyline, "pinnacle", 60, 80.0, 55.0)]);
        let signals = processor(15.0).generate_signals(&c).unwrap();

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.selection, Selection::Away);
        assert_eq!(s.strength, SignalStrength::Strong);
        assert!((s.base_confidence - (0.5 + 0.5 * 25.0 / 40.0)).abs() < 1e-9);
        assert_eq!(s.evidence.len(), 1);
    }

    #[test]
    fn test_uses_latest_record_per_book() {
        let c = ctx(vec![
            pct(MarketType::Total, "circa", 300, 40.0, 70.0),
            pct(MarketType::Total, "circa", 60, 50.0, 52.0),
        ]);
        assert!(processor(15.0).generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_missing_percentages_are_skipped() {
        let c = ctx(vec![crate::strategy::processors::fixtures::moneyline("dk", 60, -120, 100)]);
        assert!(processor(15.0).generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_split_books_yield_nothing() {
        let c = ctx(vec![
            pct(MarketType::Spread, "circa", 60, 30.0, 50.0),
            pct(MarketType::Spread, "dk", 60, 70.0, 50.0),
        ]);
        assert!(processor(15.0).generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_min_books_requirement() {
        let c = ctx(vec![
            pct(MarketType::Spread, "circa", 60, 30.0, 55.0),
            pct(MarketType::Spread, "dk", 60, 45.0, 48.0),
        ]);
        let p = SharpActionProcessor::new(SharpActionConfig {
            min_books: 2,
            ..SharpActionConfig::default()
        });
        assert!(p.generate_signals(&c).unwrap().is_empty());
        assert_eq!(processor(15.0).generate_signals(&c).unwrap()[0].selection, Selection::Home);
    }
}
