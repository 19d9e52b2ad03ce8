//! Underdog value: plus-money dogs the public is ignoring
//!
//! Moneyline only. Fires when the public ticket share on the favourite is at
//! least `public_favorite_threshold` and the best underdog price across books
//! sits inside `[min_dog_price, max_dog_price]`.

use crate::config::UnderdogValueConfig;
use crate::domain::odds::implied_probability;
use crate::domain::{MarketType, OddsRecord, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, mean};

/// Underdog value processor
pub struct UnderdogValueProcessor {
    config: UnderdogValueConfig,
}

impl UnderdogValueProcessor {
    pub fn new(config: UnderdogValueConfig) -> Self {
        Self { config }
    }

    fn analyze(&self, ctx: &GameContext) -> Result<Option<Signal>> {
        let market = MarketType::Moneyline;
        let latest = ctx.latest_by_book(market);

        // Favourite by consensus implied probability of the home price
        let home_probs: Vec<f64> = latest
            .iter()
            .filter_map(|r| r.primary_price.map(implied_probability))
            .collect();
        let away_probs: Vec<f64> = latest
            .iter()
            .filter_map(|r| r.opposing_price.map(implied_probability))
            .collect();
        let (Some(home_prob), Some(away_prob)) = (mean(&home_probs), mean(&away_probs)) else {
            return Ok(None);
        };
        if home_prob == away_prob {
            return Ok(None);
        }
        let favorite = if home_prob > away_prob {
            market.primary()
        } else {
            market.primary().opposite()
        };
        let dog = favorite.opposite();

        let Some((dog_price, price_book)) = latest
            .iter()
            .filter_map(|r| r.price_for(dog).map(|p| (p, *r)))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.sportsbook.cmp(&a.1.sportsbook)))
        else {
            return Ok(None);
        };
        if dog_price < self.config.min_dog_price || dog_price > self.config.max_dog_price {
            return Ok(None);
        }

        let pct_records: Vec<&OddsRecord> = latest.iter().copied().filter(|r| r.bet_pct.is_some()).collect();
        let fav_bets: Vec<f64> = pct_records.iter().filter_map(|r| r.bet_pct_for(favorite)).collect();
        let Some(public_on_fav) = mean(&fav_bets) else {
            return Ok(None);
        };
        if public_on_fav < self.config.public_favorite_threshold {
            return Ok(None);
        }

        let dog_money: Vec<f64> = pct_records.iter().filter_map(|r| r.money_pct_for(dog)).collect();
        let money_support = mean(&dog_money)
            .map(|money| money - (100.0 - public_on_fav))
            .filter(|edge| *edge >= self.config.min_dog_money_support);
        if self.config.require_money_support && money_support.is_none() {
            return Ok(None);
        }

        let public_excess = (public_on_fav - self.config.public_favorite_threshold) / 20.0;
        let support_bonus = if money_support.is_some() { 0.1 } else { 0.0 };
        let confidence = clamp_confidence(0.5 + 0.2 * public_excess.min(1.0) + support_bonus);
        let strength = match (money_support.is_some(), public_excess >= 0.5) {
            (true, true) => SignalStrength::Strong,
            (true, false) | (false, true) => SignalStrength::Moderate,
            (false, false) => SignalStrength::Weak,
        };

        let mut evidence: Vec<OddsRecord> = pct_records.into_iter().cloned().collect();
        if !evidence.iter().any(|r| r == price_book) {
            evidence.push(price_book.clone());
        }

        let mut signal = Signal::new(self.id(), &ctx.game().id, market, dog, confidence, ctx.cutoff())?
            .with_price(Some(dog_price))
            .with_strength(strength)
            .with_reason(format!(
                "{public_on_fav:.0}% of tickets on the favourite, {dog} available at +{dog_price} ({})",
                price_book.sportsbook
            ))
            .with_detail("best_book", &price_book.sportsbook)
            .with_evidence(evidence);
        if let Some(edge) = money_support {
            signal = signal.with_detail("money_support", format!("{edge:.1}"));
        }

        Ok(Some(signal))
    }
}

impl Default for UnderdogValueProcessor {
    fn default() -> Self {
        Self::new(UnderdogValueConfig::default())
    }
}

impl SignalProcessor for UnderdogValueProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::UnderdogValue
    }

    fn name(&self) -> &str {
        "Underdog Value"
    }

    fn description(&self) -> &str {
        "Backs underdogs in a value price band when the public piles onto the favourite"
    }

    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
        Ok(self.analyze(ctx)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Selection;
    use crate::strategy::processors::fixtures::before;

    fn rec(book: &str, home: i32, away: i32, bet: f64, money: f64) -> OddsRecord {
        OddsRecord::builder("g1", MarketType::Moneyline, book, before(60))
            .prices(home, away)
            .percentages(bet, money)
            .build()
            .unwrap()
    }

    fn ctx(records: Vec<OddsRecord>) -> GameContext {
        crate::strategy::processors::fixtures::ctx(records)
    }

    #[test]
    fn test_dog_in_band_with_public_on_favorite() {
        let c = ctx(vec![rec("dk", -170, 150, 75.0, 60.0), rec("fanduel", -165, 145, 72.0, 58.0)]);
        let signals = UnderdogValueProcessor::default().generate_signals(&c).unwrap();

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.selection, Selection::Away);
        assert_eq!(s.price, Some(150));
        assert_eq!(s.details["best_book"], "dk");
        // Dog money 41% vs dog tickets 26.5%
        assert!(s.details.contains_key("money_support"));
    }

    #[test]
    fn test_price_outside_band() {
        let c = ctx(vec![rec("dk", -450, 350, 85.0, 80.0)]);
        assert!(UnderdogValueProcessor::default().generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_public_not_heavy_enough() {
        let c = ctx(vec![rec("dk", -170, 150, 55.0, 50.0)]);
        assert!(UnderdogValueProcessor::default().generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_required_money_support() {
        // Dog money 20% vs dog tickets 20%
        let c = ctx(vec![rec("dk", -170, 150, 80.0, 80.0)]);
        let strict = UnderdogValueProcessor::new(UnderdogValueConfig {
            require_money_support: true,
            ..UnderdogValueConfig::default()
        });
        assert!(strict.generate_signals(&c).unwrap().is_empty());
        assert_eq!(UnderdogValueProcessor::default().generate_signals(&c).unwrap().len(), 1);
    }

    #[test]
    fn test_ignores_other_markets() {
        let c = ctx(vec![crate::strategy::processors::fixtures::pct(
            MarketType::Total,
            "dk",
            60,
            80.0,
            50.0,
        )]);
        assert!(UnderdogValueProcessor::default().generate_signals(&c).unwrap().is_empty());
    }
}
