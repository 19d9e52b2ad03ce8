//! Public fade: bet against a lopsided public side
//!
//! Requires the ticket share to be high on average across several books with
//! low book-to-book dispersion, so a single noisy feed cannot trigger it.

use crate::config::PublicFadeConfig;
use crate::domain::{MarketType, OddsRecord, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, mean, std_dev};

/// Public fade processor
pub struct PublicFadeProcessor {
    config: PublicFadeConfig,
}

impl PublicFadeProcessor {
    pub fn new(config: PublicFadeConfig) -> Self {
        Self { config }
    }

    fn analyze(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let latest: Vec<&OddsRecord> = ctx
            .latest_by_book(market)
            .into_iter()
            .filter(|r| r.bet_pct.is_some())
            .collect();
        if latest.len() < self.config.min_books {
            return Ok(None);
        }

        for public_side in market.selections() {
            let shares: Vec<f64> = latest.iter().filter_map(|r| r.bet_pct_for(public_side)).collect();
            let (Some(avg), Some(spread)) = (mean(&shares), std_dev(&shares)) else {
                continue;
            };
            if avg < self.config.public_threshold || spread > self.config.max_book_stddev {
                continue;
            }

            let excess = avg - self.config.public_threshold;
            let strength = match excess {
                e if e >= 20.0 => SignalStrength::VeryStrong,
                e if e >= 12.0 => SignalStrength::Strong,
                e if e >= 5.0 => SignalStrength::Moderate,
                _ => SignalStrength::Weak,
            };
            let headroom = (100.0 - self.config.public_threshold).max(1.0);
            let agreement = if self.config.max_book_stddev > 0.0 {
                1.0 - spread / self.config.max_book_stddev
            } else {
                1.0
            };
            let confidence =
                clamp_confidence(0.5 + 0.3 * (excess / headroom).min(1.0) + 0.1 * agreement);

            let fade = public_side.opposite();
            return Ok(Some(
                Signal::new(self.id(), &ctx.game().id, market, fade, confidence, ctx.cutoff())?
                    .with_strength(strength)
                    .with_reason(format!(
                        "{avg:.0}% of tickets on {public_side} across {} books (sd {spread:.1})",
                        shares.len()
                    ))
                    .with_detail("public_pct", format!("{avg:.1}"))
                    .with_detail("book_stddev", format!("{spread:.2}"))
                    .with_evidence(latest.into_iter().cloned().collect()),
            ));
        }

        Ok(None)
    }
}

impl Default for PublicFadeProcessor {
    fn default() -> Self {
        Self::new(PublicFadeConfig::default())
    }
}

impl SignalProcessor for PublicFadeProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::PublicFade
    }

    fn name(&self) -> &str {
        "Public Fade"
    }

    fn description(&self) -> &str {
        "Fades a heavily bet public side when books agree on the ticket share"
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
