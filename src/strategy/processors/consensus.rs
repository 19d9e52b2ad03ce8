//! Consensus: tickets and money agreeing on one side
//!
//! Heavy consensus is both shares above ~90%; mixed consensus is the money
//! above ~80% with tickets only above ~60%. By default the processor follows
//! the consensus side; `mode = "fade"` recommends the other side instead.

use crate::config::{ConsensusConfig, ConsensusMode};
use crate::domain::{MarketType, OddsRecord, Selection, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, mean};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsensusPattern {
    Heavy,
    Mixed,
}

impl ConsensusPattern {
    fn as_str(&self) -> &'static str {
        match self {
            ConsensusPattern::Heavy => "heavy",
            ConsensusPattern::Mixed => "mixed",
        }
    }
}

/// Consensus processor
pub struct ConsensusProcessor {
    config: ConsensusConfig,
}

impl ConsensusProcessor {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    fn classify(&self, bet: f64, money: f64) -> Option<ConsensusPattern> {
        let c = &self.config;
        if money >= c.heavy_money_pct && bet >= c.heavy_bet_pct {
            Some(ConsensusPattern::Heavy)
        } else if money >= c.mixed_money_pct && bet >= c.mixed_bet_pct {
            Some(ConsensusPattern::Mixed)
        } else {
            None
        }
    }

    fn analyze(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let latest: Vec<&OddsRecord> = ctx
            .latest_by_book(market)
            .into_iter()
            .filter(|r| r.bet_pct.is_some() && r.money_pct.is_some())
            .collect();
        let bets: Vec<f64> = latest.iter().filter_map(|r| r.bet_pct).collect();
        let money: Vec<f64> = latest.iter().filter_map(|r| r.money_pct).collect();
        let (Some(bet_primary), Some(money_primary)) = (mean(&bets), mean(&money)) else {
            return Ok(None);
        };

        let found = market.selections().into_iter().find_map(|side| {
            let (bet, money) = if side.is_primary(market) {
                (bet_primary, money_primary)
            } else {
                (100.0 - bet_primary, 100.0 - money_primary)
            };
            self.classify(bet, money).map(|p| (side, p, bet, money))
        });
        let Some((side, pattern, bet, money)) = found else {
            return Ok(None);
        };

        let selection: Selection = match self.config.mode {
            ConsensusMode::Follow => side,
            ConsensusMode::Fade => side.opposite(),
        };
        let (base, strength) = match pattern {
            ConsensusPattern::Heavy => (0.70, SignalStrength::Strong),
            ConsensusPattern::Mixed => (0.60, SignalStrength::Moderate),
        };
        // Extra money beyond the pattern's floor adds a little conviction
        let floor = match pattern {
            ConsensusPattern::Heavy => self.config.heavy_money_pct,
            ConsensusPattern::Mixed => self.config.mixed_money_pct,
        };
        let confidence = clamp_confidence(base + 0.1 * ((money - floor) / 10.0).clamp(0.0, 1.0));

        Ok(Some(
            Signal::new(self.id(), &ctx.game().id, market, selection, confidence, ctx.cutoff())?
                .with_strength(strength)
                .with_reason(format!(
                    "{} consensus on {side}: {bet:.0}% tickets, {money:.0}% money",
                    pattern.as_str()
                ))
                .with_detail("pattern", pattern.as_str())
                .with_detail("mode", format!("{:?}", self.config.mode).to_lowercase())
                .with_evidence(latest.into_iter().cloned().collect()),
        ))
    }
}

impl Default for ConsensusProcessor {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}

impl SignalProcessor for ConsensusProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::Consensus
    }

    fn name(&self) -> &str {
        "Consensus"
    }

    fn description(&self) -> &str {
        "Acts on heavy or mixed agreement between ticket and money shares"
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
