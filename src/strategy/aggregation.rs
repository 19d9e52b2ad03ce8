//! Cross-strategy aggregation
//!
//! Deduplicates repeated recommendations from one strategy and resolves
//! opposite-side recommendations on the same game and market. Nothing is
//! dropped by conflict resolution; losers are flagged `Suppressed` and exact
//! ties are flagged `Conflicting` on both sides.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::domain::{ConflictStatus, MarketType, ScoredSignal, Selection, StrategyId};

/// Confidences closer than this are treated as a tie
const TIE_EPSILON: f64 = 1e-9;

/// Detected disagreement on one game + market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConflict {
    pub game_id: String,
    pub market: MarketType,
    /// Side that won, `None` on a tie
    pub winner: Option<Selection>,
    /// Best confidence per side
    pub confidences: Vec<(Selection, f64)>,
    pub strategies: Vec<StrategyId>,
}

/// Collapse signals sharing strategy, game, market and selection to the
/// highest final confidence
pub fn deduplicate(signals: Vec<ScoredSignal>) -> Vec<ScoredSignal> {
    let mut best: HashMap<(StrategyId, String, MarketType, Selection), ScoredSignal> = HashMap::new();
    for signal in signals {
        let key = (
            signal.strategy(),
            signal.game_id().to_string(),
            signal.market(),
            signal.selection(),
        );
        match best.get(&key) {
            Some(existing) if !outranks(&signal, existing) => {}
            _ => {
                best.insert(key, signal);
            }
        }
    }
    best.into_values().collect()
}

fn outranks(candidate: &ScoredSignal, incumbent: &ScoredSignal) -> bool {
    candidate
        .final_confidence
        .total_cmp(&incumbent.final_confidence)
        .then_with(|| candidate.signal.base_confidence.total_cmp(&incumbent.signal.base_confidence))
        .then_with(|| incumbent.signal.reason.cmp(&candidate.signal.reason))
        .is_gt()
}

/// Flag each signal with its conflict status and report the conflicts found
pub fn resolve_conflicts(signals: &mut [ScoredSignal]) -> Vec<SignalConflict> {
    let mut groups: BTreeMap<(String, MarketType), Vec<usize>> = BTreeMap::new();
    for (idx, signal) in signals.iter().enumerate() {
        groups
            .entry((signal.game_id().to_string(), signal.market()))
            .or_default()
            .push(idx);
    }

    let mut conflicts = Vec::new();
    for ((game_id, market), members) in groups {
        let mut best_per_side: BTreeMap<Selection, f64> = BTreeMap::new();
        for &idx in &members {
            let entry = best_per_side.entry(signals[idx].selection()).or_insert(f64::MIN);
            *entry = entry.max(signals[idx].final_confidence);
        }

        if best_per_side.len() < 2 {
            for &idx in &members {
                signals[idx].conflict = ConflictStatus::Uncontested;
            }
            continue;
        }

        let mut sides: Vec<(Selection, f64)> = best_per_side.into_iter().collect();
        sides.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let tie = (sides[0].1 - sides[1].1).abs() < TIE_EPSILON;
        let winner = if tie { None } else { Some(sides[0].0) };

        for &idx in &members {
            signals[idx].conflict = match winner {
                None => ConflictStatus::Conflicting,
                Some(side) if signals[idx].selection() == side => ConflictStatus::Primary,
                Some(_) => ConflictStatus::Suppressed,
            };
        }

        let mut strategies: Vec<StrategyId> = members.iter().map(|&i| signals[i].strategy()).collect();
        strategies.sort();
        strategies.dedup();

        info!(
            game_id = %game_id,
            market = %market,
            winner = ?winner,
            "resolved conflicting recommendations"
        );
        conflicts.push(SignalConflict {
            game_id,
            market,
            winner,
            confidences: sides,
            strategies,
        });
    }

    conflicts
}

/// Deterministic output order: final confidence desc, then game, market,
/// strategy, selection
pub fn sort_signals(signals: &mut [ScoredSignal]) {
    signals.sort_by(|a, b| {
        b.final_confidence
            .total_cmp(&a.final_confidence)
            .then_with(|| a.game_id().cmp(b.game_id()))
            .then_with(|| a.market().cmp(&b.market()))
            .then_with(|| a.strategy().cmp(&b.strategy()))
            .then_with(|| a.selection().cmp(&b.selection()))
    });
}
