//! Late flip: follow the early side after a late swing
//!
//! Compares the share on the primary selection in the baseline window
//! (`baseline_window_hours` .. `late_window_hours` before start) with the
//! latest per-book share inside the late window. When the favoured side
//! flips and the swing is at least `min_swing`, the early side is
//! recommended. Money is checked before tickets.

use chrono::Duration;
use std::collections::BTreeMap;

use crate::config::LateFlipConfig;
use crate::domain::{MarketType, OddsRecord, Selection, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, mean};

type ShareFn = fn(&OddsRecord) -> Option<f64>;

fn money_share(rec: &OddsRecord) -> Option<f64> {
    rec.money_pct
}

fn bet_share(rec: &OddsRecord) -> Option<f64> {
    rec.bet_pct
}

const METRICS: [(&str, ShareFn); 2] = [("money", money_share), ("bets", bet_share)];

fn favoured(market: MarketType, primary_share: f64) -> Option<Selection> {
    if primary_share > 50.0 {
        Some(market.primary())
    } else if primary_share < 50.0 {
        Some(market.primary().opposite())
    } else {
        None
    }
}

/// Late flip processor
pub struct LateFlipProcessor {
    config: LateFlipConfig,
}

impl LateFlipProcessor {
    pub fn new(config: LateFlipConfig) -> Self {
        Self { config }
    }

    fn analyze(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let start = ctx.game().start_time;
        let late_start = start - Duration::hours(self.config.late_window_hours);
        let baseline_start = start - Duration::hours(self.config.baseline_window_hours);

        let baseline: Vec<&OddsRecord> = ctx
            .market_records(market)
            .filter(|r| r.observed_at >= baseline_start && r.observed_at < late_start)
            .collect();
        let mut late_by_book: BTreeMap<&str, &OddsRecord> = BTreeMap::new();
        for rec in ctx.market_records(market).filter(|r| r.observed_at >= late_start) {
            late_by_book.insert(rec.sportsbook.as_str(), rec);
        }
        if baseline.is_empty() || late_by_book.is_empty() {
            return Ok(None);
        }

        for (metric, share) in METRICS {
            let early_values: Vec<f64> = baseline.iter().filter_map(|r| share(r)).collect();
            let late_values: Vec<f64> = late_by_book.values().filter_map(|r| share(r)).collect();
            let (Some(early), Some(late)) = (mean(&early_values), mean(&late_values)) else {
                continue;
            };
            let (Some(early_side), Some(late_side)) = (favoured(market, early), favoured(market, late))
            else {
                continue;
            };
            let swing = (late - early).abs();
            if early_side == late_side || swing < self.config.min_swing {
                continue;
            }

            let ratio = swing / self.config.min_swing;
            let confidence = clamp_confidence(0.5 + 0.35 * (swing / (2.0 * self.config.min_swing)).min(1.0));
            let mut evidence: Vec<OddsRecord> = baseline
                .iter()
                .filter(|r| share(r).is_some())
                .map(|r| (*r).clone())
                .collect();
            evidence.extend(late_by_book.values().filter(|r| share(r).is_some()).map(|r| (*r).clone()));

            return Ok(Some(
                Signal::new(self.id(), &ctx.game().id, market, early_side, confidence, ctx.cutoff())?
                    .with_strength(SignalStrength::from_ratio(ratio))
                    .with_reason(format!(
                        "{metric} flipped from {early_side} ({early:.0}%) to {late_side} ({late:.0}%) late"
                    ))
                    .with_detail("metric", metric)
                    .with_detail("swing", format!("{swing:.1}"))
                    .with_evidence(evidence),
            ));
        }

        Ok(None)
    }
}

impl Default for LateFlipProcessor {
    fn default() -> Self {
        Self::new(LateFlipConfig::default())
    }
}

impl SignalProcessor for LateFlipProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::LateFlip
    }

    fn name(&self) -> &str {
        "Late Flip"
    }

    fn description(&self) -> &str {
        "Fades a late swing in ticket or money share and follows the early side"
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
