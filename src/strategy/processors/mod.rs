//! Signal processor implementations
//!
//! Each processor encodes one betting heuristic:
//! - SharpAction: money% diverging from ticket%
//! - LineMovement: steam and reverse line movement
//! - Consensus: heavy/mixed agreement of tickets and money
//! - PublicFade: fade a lopsided, low-variance public side
//! - LateFlip: follow the early side after a late swing
//! - UnderdogValue: underdogs in a value price band against a public favourite
//! - BookConflict: books disagreeing on the line or price
//! - TimingBased: sharp action gated by a time-to-game threshold
//! - HybridSharp: sharp action confirmed by line movement

pub mod book_conflict;
pub mod consensus;
pub mod hybrid_sharp;
pub mod late_flip;
pub mod line_movement;
pub mod public_fade;
pub mod sharp_action;
pub mod timing_based;
pub mod underdog_value;

pub use book_conflict::BookConflictProcessor;
pub use consensus::ConsensusProcessor;
pub use hybrid_sharp::HybridSharpProcessor;
pub use late_flip::LateFlipProcessor;
pub use line_movement::LineMovementProcessor;
pub use public_fade::PublicFadeProcessor;
pub use sharp_action::SharpActionProcessor;
pub use timing_based::TimingBasedProcessor;
pub use underdog_value::UnderdogValueProcessor;

use rust_decimal::prelude::ToPrimitive;

use crate::domain::odds::price_cents;
use crate::domain::{MarketType, OddsRecord, Selection};

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Where the market sits on the primary selection's scale. The value rises
/// as the market moves toward the primary selection: a shorter home spread,
/// a higher total, a shorter home moneyline price (in cents).
pub(crate) fn market_position(rec: &OddsRecord) -> Option<f64> {
    match rec.market {
        MarketType::Spread => rec.line?.to_f64().map(|l| -l),
        MarketType::Total => rec.line?.to_f64(),
        MarketType::Moneyline => {
            let price = rec.primary_price?;
            Some(-(price_cents(100, price) as f64))
        }
    }
}

/// Movement threshold in the market's unit (points or price cents)
pub(crate) fn move_threshold(market: MarketType, points: f64, cents: i32) -> f64 {
    if market.uses_points() {
        points
    } else {
        cents as f64
    }
}

/// Selection a positive/negative move on the primary scale favours
pub(crate) fn side_for_direction(market: MarketType, delta: f64) -> Selection {
    if delta > 0.0 {
        market.primary()
    } else {
        market.primary().opposite()
    }
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
