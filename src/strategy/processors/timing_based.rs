//! Timing-based sharp action
//!
//! Classifies the newest observation of a market into a [`TimingBucket`] and
//! requires the sharp differential to clear that bucket's threshold. Late
//! money is harder to fake, so later buckets need a smaller differential.

use crate::config::TimingBasedConfig;
use crate::domain::{MarketType, Signal, SignalStrength, StrategyId, TimingBucket};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::clamp_confidence;
use super::sharp_action::read_sharp;

/// Timing-based processor
pub struct TimingBasedProcessor {
    config: TimingBasedConfig,
}

impl TimingBasedProcessor {
    pub fn new(config: TimingBasedConfig) -> Self {
        Self { config }
    }

    fn analyze(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let Some(observed) = ctx.latest_observation(market) else {
            return Ok(None);
        };
        let bucket = TimingBucket::from_times(observed, ctx.game().start_time);
        let Some(threshold) = self.config.threshold_for(bucket) else {
            return Ok(None);
        };
        let Some(reading) = read_sharp(ctx, market, threshold, 1) else {
            return Ok(None);
        };

        let rank = TimingBucket::ALL.iter().position(|b| *b == bucket).unwrap_or(0) as f64;
        let excess = if threshold > 0.0 {
            (reading.differential - threshold) / threshold
        } else {
            1.0
        };
        let confidence = clamp_confidence((0.5 + 0.25 * excess.min(1.0) + 0.025 * rank).min(0.95));
        let strength = SignalStrength::from_ratio(reading.differential / threshold.max(1.0));

        Ok(Some(
            Signal::new(self.id(), &ctx.game().id, market, reading.selection, confidence, ctx.cutoff())?
                .with_strength(strength)
                .with_reason(format!(
                    "{:.1} pt money/ticket gap in the {bucket} window (needs {threshold:.0})",
                    reading.differential
                ))
                .with_detail("timing_bucket", bucket)
                .with_detail("threshold", threshold)
                .with_evidence(reading.books.into_iter().cloned().collect()),
        ))
    }
}

impl Default for TimingBasedProcessor {
    fn default() -> Self {
        Self::new(TimingBasedConfig::default())
    }
}

impl SignalProcessor for TimingBasedProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::TimingBased
    }

    fn name(&self) -> &str {
        "Timing Based"
    }

    fn description(&self) -> &str {
        "Sharp action with thresholds that relax as game time approaches"
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
    use crate::strategy::processors::fixtures::{ctx, pct};

    #[test]
    fn test_same_gap_passes_late_but_not_early() {
        // 16 pt gap toward home
        let late = ctx(vec![pct(MarketType::Moneyline, "circa", 20, 40.0, 56.0)]);
        let early = ctx(vec![pct(MarketType::Moneyline, "circa", 30 * 60, 40.0, 56.0)]);
        let p = TimingBasedProcessor::default();

        let signals = p.generate_signals(&late).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].selection, Selection::Home);
        assert_eq!(signals[0].details["timing_bucket"], "very_late");
        assert!(p.generate_signals(&early).unwrap().is_empty());
    }

    #[test]
    fn test_later_bucket_scores_higher() {
        let p = TimingBasedProcessor::default();
        let late = ctx(vec![pct(MarketType::Total, "circa", 5, 30.0, 65.0)]);
        let early = ctx(vec![pct(MarketType::Total, "circa", 50 * 60, 30.0, 65.0)]);

        let late_conf = p.generate_signals(&late).unwrap()[0].base_confidence;
        let early_conf = p.generate_signals(&early).unwrap()[0].base_confidence;
        assert!(late_conf > early_conf);
    }
}
