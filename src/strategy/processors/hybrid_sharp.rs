//! Hybrid sharp: sharp action confirmed by line movement
//!
//! Runs the sharp-action reading and the line-movement analysis on the same
//! market and emits only when both point at the same selection.
//!
//! Correlation tiers:
//! - PERFECT: differential >= `perfect_differential` and a confirming steam move
//! - STRONG: differential >= `strong_differential` or a confirming steam move
//! - MODERATE: any other agreement

use std::fmt;

use crate::config::{HybridSharpConfig, LineMovementConfig};
use crate::domain::{MarketType, OddsRecord, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::line_movement::{detect_steam, net_movement};
use super::sharp_action::read_sharp;
use super::{clamp_confidence, move_threshold};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CorrelationTier {
    Moderate,
    Strong,
    Perfect,
}

impl CorrelationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationTier::Moderate => "MODERATE",
            CorrelationTier::Strong => "STRONG",
            CorrelationTier::Perfect => "PERFECT",
        }
    }

    fn base_confidence(&self) -> f64 {
        match self {
            CorrelationTier::Moderate => 0.60,
            CorrelationTier::Strong => 0.72,
            CorrelationTier::Perfect => 0.85,
        }
    }

    fn strength(&self) -> SignalStrength {
        match self {
            CorrelationTier::Moderate => SignalStrength::Moderate,
            CorrelationTier::Strong => SignalStrength::Strong,
            CorrelationTier::Perfect => SignalStrength::VeryStrong,
        }
    }
}

impl fmt::Display for CorrelationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hybrid sharp processor
pub struct HybridSharpProcessor {
    config: HybridSharpConfig,
    movement: LineMovementConfig,
}

impl HybridSharpProcessor {
    pub fn new(config: HybridSharpConfig, movement: LineMovementConfig) -> Self {
        Self { config, movement }
    }

    fn tier(&self, differential: f64, steam: bool) -> CorrelationTier {
        if differential >= self.config.perfect_differential && steam {
            CorrelationTier::Perfect
        } else if differential >= self.config.strong_differential || steam {
            CorrelationTier::Strong
        } else {
            CorrelationTier::Moderate
        }
    }

    fn analyze(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let Some(sharp) = read_sharp(ctx, market, self.config.min_differential, 1) else {
            return Ok(None);
        };

        // Steam confirms outright; otherwise a net move of the minimum size
        let steam = detect_steam(ctx, market, &self.movement).filter(|s| s.selection == sharp.selection);
        let min_move = move_threshold(
            market,
            self.config.min_line_move_points,
            self.config.min_line_move_cents,
        );
        let net = net_movement(ctx, market)
            .filter(|n| n.delta.abs() >= min_move && n.selection(market) == sharp.selection);

        let line_evidence: Vec<&OddsRecord> = match (&steam, &net) {
            (Some(s), _) => s.evidence.clone(),
            (None, Some(n)) => n.evidence.clone(),
            (None, None) => return Ok(None),
        };
        let moving_books = steam.as_ref().map(|s| s.books).or(net.as_ref().map(|n| n.books));

        let tier = self.tier(sharp.differential, steam.is_some());
        let bonus = 0.1 * ((sharp.differential - self.config.min_differential) / 20.0).clamp(0.0, 1.0);
        let confidence = clamp_confidence(tier.base_confidence() + bonus);

        let mut evidence: Vec<OddsRecord> = sharp.books.iter().map(|r| (*r).clone()).collect();
        evidence.extend(line_evidence.into_iter().cloned());
        evidence.sort_by(|a, b| {
            a.observed_at
                .cmp(&b.observed_at)
                .then_with(|| a.sportsbook.cmp(&b.sportsbook))
        });
        evidence.dedup();

        let mut signal = Signal::new(self.id(), &ctx.game().id, market, sharp.selection, confidence, ctx.cutoff())?
            .with_strength(tier.strength())
            .with_reason(format!(
                "{tier} correlation: {:.1} pt sharp gap and line moving toward {}",
                sharp.differential, sharp.selection
            ))
            .with_detail("correlation", tier)
            .with_detail("steam", steam.is_some())
            .with_evidence(evidence);
        if let Some(books) = moving_books {
            signal = signal.with_detail("moving_books", books);
        }

        Ok(Some(signal))
    }
}

impl Default for HybridSharpProcessor {
    fn default() -> Self {
        Self::new(HybridSharpConfig::default(), LineMovementConfig::default())
    }
}

impl SignalProcessor for HybridSharpProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::HybridSharp
    }

    fn name(&self) -> &str {
        "Hybrid Sharp"
    }

    fn description(&self) -> &str {
        "Sharp money confirmed by line movement in the same direction"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Selection;
    use crate::strategy::processors::fixtures::{before, ctx, pct};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn spread(book: &str, minutes: i64, home_line: Decimal, bet: f64, money: f64) -> OddsRecord {
        OddsRecord::builder("g1", MarketType::Spread, book, before(minutes))
            .line(home_line)
            .prices(-110, -110)
            .percentages(bet, money)
            .build()
            .unwrap()
    }

    #[test]
    fn test_perfect_with_steam_and_big_gap() {
        let mut records = Vec::new();
        for book in ["circa", "dk", "fanduel"] {
            records.push(spread(book, 100, dec!(-3.0), 40.0, 50.0));
            records.push(spread(book, 85, dec!(-3.5), 35.0, 62.0));
        }
        let signals = HybridSharpProcessor::default().generate_signals(&ctx(records)).unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].selection, Selection::Home);
        assert_eq!(signals[0].details["correlation"], "PERFECT");
        assert_eq!(signals[0].strength, SignalStrength::VeryStrong);
    }

    #[test]
    fn test_moderate_with_net_move_only() {
        let c = ctx(vec![
            spread("circa", 300, dec!(-3.0), 45.0, 50.0),
            spread("circa", 60, dec!(-3.5), 40.0, 57.0),
        ]);
        let signals = HybridSharpProcessor::default().generate_signals(&c).unwrap();
        assert_eq!(signals[0].details["correlation"], "MODERATE");
        assert_eq!(signals[0].details["steam"], "false");
    }

    #[test]
    fn test_disagreement_emits_nothing() {
        // Money on home, line moving toward away
        let c = ctx(vec![
            spread("circa", 300, dec!(-3.5), 45.0, 50.0),
            spread("circa", 60, dec!(-2.5), 35.0, 60.0),
        ]);
        assert!(HybridSharpProcessor::default().generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_no_line_data_emits_nothing() {
        let c = ctx(vec![pct(MarketType::Moneyline, "circa", 60, 30.0, 60.0)]);
        assert!(HybridSharpProcessor::default().generate_signals(&c).unwrap().is_empty());
    }
}
