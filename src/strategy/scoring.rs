//! Weighted confidence model
//!
//! final = base x book x timing x volume x strategy, clamped to [0, 1].

use tracing::trace;

use crate::config::ScoringConfig;
use crate::domain::{
    ConfidenceModifiers, ConflictStatus, Game, ScoredSignal, Signal, TimingBucket,
};

/// Applies the configured modifiers to processor output
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Scorer whose final confidence equals the base confidence
    pub fn neutral() -> Self {
        Self::new(ScoringConfig::neutral())
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Credibility weight of a sportsbook (case-insensitive)
    pub fn book_weight(&self, sportsbook: &str) -> f64 {
        self.config
            .book_weights
            .get(&sportsbook.trim().to_lowercase())
            .copied()
            .unwrap_or(self.config.default_book_weight)
    }

    /// Mean evidence-book weight relative to the credibility baseline
    pub fn book_modifier(&self, signal: &Signal) -> f64 {
        let books = signal.books();
        let weights: Vec<f64> = if books.is_empty() {
            vec![self.config.default_book_weight]
        } else {
            books.iter().map(|b| self.book_weight(b)).collect()
        };
        let avg = weights.iter().sum::<f64>() / weights.len() as f64;
        avg / self.config.credibility_baseline
    }

    pub fn timing_modifier(&self, bucket: TimingBucket) -> f64 {
        TimingBucket::ALL
            .iter()
            .position(|b| *b == bucket)
            .and_then(|idx| self.config.timing_multipliers.get(idx))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn volume_modifier(&self, bets: Option<u32>) -> f64 {
        let Some(bets) = bets else {
            return self.config.unknown_volume_multiplier;
        };
        self.config
            .volume_tiers
            .iter()
            .find(|tier| bets >= tier.min_bets)
            .map(|tier| tier.multiplier)
            .unwrap_or(self.config.unknown_volume_multiplier)
    }

    pub fn strategy_modifier(&self, signal: &Signal) -> f64 {
        self.config
            .strategy_modifiers
            .get(&signal.strategy)
            .copied()
            .unwrap_or(1.0)
    }

    /// Score a signal for the game it was generated on
    pub fn score(&self, signal: Signal, game: &Game) -> ScoredSignal {
        let timing = TimingBucket::from_times(signal.latest_evidence_at(), game.start_time);
        let modifiers = ConfidenceModifiers {
            book: self.book_modifier(&signal),
            timing: self.timing_modifier(timing),
            volume: self.volume_modifier(signal.total_bet_volume()),
            strategy: self.strategy_modifier(&signal),
        };

        let raw = signal.base_confidence * modifiers.product();
        let final_confidence = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
        let level = self.config.level_for(final_confidence);

        trace!(
            strategy = %signal.strategy,
            game_id = %signal.game_id,
            base = signal.base_confidence,
            final_confidence,
            "scored signal"
        );

        ScoredSignal {
            signal,
            final_confidence,
            level,
            modifiers,
            timing,
            conflict: ConflictStatus::Uncontested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfidenceLevel, MarketType, OddsRecord, Selection, StrategyId};
    use chrono::{Duration, TimeZone, Utc};

    fn game() -> Game {
        Game::new("g1", "NYY", "BOS", Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap()).unwrap()
    }

    fn signal(strategy: StrategyId, base: f64, book: &str, minutes_before: i64, bets: Option<u32>) -> Signal {
        let g = game();
        let mut builder = OddsRecord::builder(
            "g1",
            MarketType::Moneyline,
            book,
            g.start_time - Duration::minutes(minutes_before),
        )
        .percentages(40.0, 60.0);
        if let Some(n) = bets {
            builder = builder.bet_count(n);
        }
        Signal::new(strategy, "g1", MarketType::Moneyline, Selection::Home, base, g.start_time)
            .unwrap()
            .with_evidence(vec![builder.build().unwrap()])
    }

    #[test]
    fn test_sharp_books_outweigh_recreational() {
        let scorer = ConfidenceScorer::default();
        assert!(scorer.book_weight("Pinnacle") > scorer.book_weight("draftkings"));
        assert!(scorer.book_weight("draftkings") > scorer.book_weight("betrivers"));
        assert_eq!(scorer.book_weight("unknown-book"), 1.5);
    }

    #[test]
    fn test_timing_modifier_monotonic() {
        let scorer = ConfidenceScorer::default();
        let mods: Vec<f64> = TimingBucket::ALL.iter().map(|b| scorer.timing_modifier(*b)).collect();
        assert!(mods.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(mods[0], 0.7);
        assert_eq!(mods[8], 1.5);
    }

    #[test]
    fn test_volume_tiers() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.volume_modifier(Some(1500)), 1.3);
        assert_eq!(scorer.volume_modifier(Some(600)), 1.1);
        assert_eq!(scorer.volume_modifier(Some(200)), 1.0);
        assert_eq!(scorer.volume_modifier(Some(50)), 0.8);
        assert_eq!(scorer.volume_modifier(None), 1.0);
    }

    #[test]
    fn test_score_combines_and_clamps() {
        let scorer = ConfidenceScorer::default();
        // pinnacle 4.0/2.5 = 1.6, ultra late 1.5, 1000+ bets 1.3
        let scored = scorer.score(signal(StrategyId::SharpAction, 0.9, "pinnacle", 5, Some(1200)), &game());
        assert_eq!(scored.final_confidence, 1.0);
        assert_eq!(scored.level, ConfidenceLevel::High);
        assert_eq!(scored.timing, TimingBucket::UltraLate);

        // betrivers 1.0/2.5 = 0.4, very early 0.7, small sample 0.8
        let scored = scorer.score(signal(StrategyId::SharpAction, 0.9, "betrivers", 3000, Some(100)), &game());
        assert!((scored.final_confidence - 0.9 * 0.4 * 0.7 * 0.8).abs() < 1e-9);
        assert_eq!(scored.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_neutral_scorer_preserves_base() {
        let scorer = ConfidenceScorer::neutral();
        let scored = scorer.score(signal(StrategyId::HybridSharp, 0.85, "pinnacle", 5, Some(5000)), &game());
        assert!((scored.final_confidence - 0.85).abs() < 1e-12);
        assert_eq!(scored.level, ConfidenceLevel::High);
        assert_eq!(scored.conflict, ConflictStatus::Uncontested);
    }
}
