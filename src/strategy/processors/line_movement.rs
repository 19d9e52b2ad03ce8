//! Line movement: steam moves and reverse line movement
//!
//! Steam is a same-direction move of at least `steam_min_move` at
//! `steam_min_books` or more books inside one `steam_window_minutes` window.
//! Reverse line movement is a net move against the side holding most of the
//! tickets.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::LineMovementConfig;
use crate::domain::{MarketType, OddsRecord, Selection, Signal, SignalStrength, StrategyId};
use crate::error::Result;
use crate::strategy::traits::{GameContext, SignalProcessor};

use super::{clamp_confidence, market_position, mean, move_threshold, side_for_direction};

/// Coordinated move across books
#[derive(Debug, Clone)]
pub(crate) struct SteamMove<'a> {
    pub selection: Selection,
    pub books: usize,
    /// Mean absolute move of the participating books
    pub avg_move: f64,
    pub threshold: f64,
    pub evidence: Vec<&'a OddsRecord>,
}

/// Net move from each book's first to last observation
#[derive(Debug, Clone)]
pub(crate) struct NetMove<'a> {
    /// Mean move on the primary scale (positive favours the primary selection)
    pub delta: f64,
    pub books: usize,
    pub evidence: Vec<&'a OddsRecord>,
}

impl NetMove<'_> {
    pub fn selection(&self, market: MarketType) -> Selection {
        side_for_direction(market, self.delta)
    }
}

struct BookMove<'a> {
    book: &'a str,
    at: DateTime<Utc>,
    delta: f64,
    from: &'a OddsRecord,
    to: &'a OddsRecord,
}

fn positioned<'a>(history: &[&'a OddsRecord]) -> Vec<(&'a OddsRecord, f64)> {
    history
        .iter()
        .filter_map(|r| market_position(r).map(|p| (*r, p)))
        .collect()
}

pub(crate) fn detect_steam<'a>(
    ctx: &'a GameContext,
    market: MarketType,
    config: &LineMovementConfig,
) -> Option<SteamMove<'a>> {
    let threshold = move_threshold(market, config.steam_min_points, config.steam_min_cents);
    let window = Duration::minutes(config.steam_window_minutes);

    let mut moves: Vec<BookMove<'a>> = Vec::new();
    for (book, history) in ctx.history_by_book(market) {
        let points = positioned(&history);
        for (j, (to, to_pos)) in points.iter().enumerate() {
            // Compare against the book's earliest quote still inside the window
            let Some((from, from_pos)) = points[..j]
                .iter()
                .find(|(r, _)| to.observed_at - r.observed_at <= window)
            else {
                continue;
            };
            let delta = to_pos - from_pos;
            if delta.abs() >= threshold {
                moves.push(BookMove {
                    book,
                    at: to.observed_at,
                    delta,
                    from: *from,
                    to: *to,
                });
            }
        }
    }
    moves.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.book.cmp(b.book)));

    let mut best: Option<(usize, Vec<&BookMove<'a>>)> = None;
    for (i, anchor) in moves.iter().enumerate() {
        let direction = anchor.delta.signum();
        let mut per_book: BTreeMap<&str, &BookMove<'a>> = BTreeMap::new();
        for m in moves[i..].iter().take_while(|m| m.at - anchor.at <= window) {
            if m.delta.signum() != direction {
                continue;
            }
            let entry = per_book.entry(m.book).or_insert(m);
            if m.delta.abs() > entry.delta.abs() {
                *entry = m;
            }
        }
        let books = per_book.len();
        if books >= config.steam_min_books && best.as_ref().map_or(true, |(n, _)| books > *n) {
            best = Some((books, per_book.into_values().collect()));
        }
    }

    let (books, participants) = best?;
    let direction = participants.first()?.delta;
    let avg_move = mean(&participants.iter().map(|m| m.delta.abs()).collect::<Vec<_>>())?;
    let mut evidence: Vec<&OddsRecord> = participants.iter().flat_map(|m| [m.from, m.to]).collect();
    evidence.sort_by_key(|r| r.observed_at);

    Some(SteamMove {
        selection: side_for_direction(market, direction),
        books,
        avg_move,
        threshold,
        evidence,
    })
}

pub(crate) fn net_movement(ctx: &GameContext, market: MarketType) -> Option<NetMove<'_>> {
    let mut deltas = Vec::new();
    let mut evidence = Vec::new();
    for history in ctx.history_by_book(market).into_values() {
        let points = positioned(&history);
        let (Some((first, first_pos)), Some((last, last_pos))) = (points.first(), points.last())
        else {
            continue;
        };
        if first.observed_at == last.observed_at {
            continue;
        }
        deltas.push(last_pos - first_pos);
        evidence.push(*first);
        evidence.push(*last);
    }
    let delta = mean(&deltas)?;
    if delta == 0.0 {
        return None;
    }
    Some(NetMove {
        delta,
        books: deltas.len(),
        evidence,
    })
}

/// Mean ticket share on the primary selection across the latest book records
fn public_bet_pct(ctx: &GameContext, market: MarketType) -> Option<(f64, Vec<&OddsRecord>)> {
    let latest: Vec<&OddsRecord> = ctx
        .latest_by_book(market)
        .into_iter()
        .filter(|r| r.bet_pct.is_some())
        .collect();
    let pcts: Vec<f64> = latest.iter().filter_map(|r| r.bet_pct).collect();
    Some((mean(&pcts)?, latest))
}

/// Steam and reverse-line-movement processor
pub struct LineMovementProcessor {
    config: LineMovementConfig,
}

impl LineMovementProcessor {
    pub fn new(config: LineMovementConfig) -> Self {
        Self { config }
    }

    fn steam_signal(&self, ctx: &GameContext, market: MarketType, steam: &SteamMove) -> Result<Signal> {
        let ratio = steam.avg_move / steam.threshold;
        let extra_books = steam.books.saturating_sub(self.config.steam_min_books) as f64;
        let confidence =
            clamp_confidence((0.6 + 0.05 * extra_books + 0.15 * (ratio - 1.0).min(1.0)).min(0.95));

        Ok(Signal::new(self.id(), &ctx.game().id, market, steam.selection, confidence, ctx.cutoff())?
            .with_strength(SignalStrength::from_ratio(ratio))
            .with_reason(format!(
                "steam toward {} at {} books, avg move {:.1}",
                steam.selection, steam.books, steam.avg_move
            ))
            .with_detail("pattern", "steam")
            .with_detail("books", steam.books)
            .with_evidence(steam.evidence.iter().map(|r| (*r).clone()).collect()))
    }

    fn reverse_signal(&self, ctx: &GameContext, market: MarketType) -> Result<Option<Signal>> {
        let Some(net) = net_movement(ctx, market) else {
            return Ok(None);
        };
        let Some((public_pct, bet_records)) = public_bet_pct(ctx, market) else {
            return Ok(None);
        };

        let threshold = self.config.rlm_public_threshold;
        let (public_side, public_share) = if public_pct >= threshold {
            (market.primary(), public_pct)
        } else if 100.0 - public_pct >= threshold {
            (market.primary().opposite(), 100.0 - public_pct)
        } else {
            return Ok(None);
        };

        let min_move = move_threshold(market, self.config.rlm_min_points, self.config.rlm_min_cents);
        let line_side = net.selection(market);
        if net.delta.abs() < min_move || line_side == public_side {
            return Ok(None);
        }

        let ratio = net.delta.abs() / min_move;
        let confidence = clamp_confidence(
            0.55 + 0.2 * (ratio - 1.0).min(1.0) + 0.1 * ((public_share - threshold) / 20.0).min(1.0),
        );
        let mut evidence: Vec<OddsRecord> = net.evidence.iter().map(|r| (*r).clone()).collect();
        evidence.extend(bet_records.into_iter().cloned());
        evidence.sort_by_key(|r| r.observed_at);
        evidence.dedup();

        Ok(Some(
            Signal::new(self.id(), &ctx.game().id, market, line_side, confidence, ctx.cutoff())?
                .with_strength(SignalStrength::from_ratio(ratio))
                .with_reason(format!(
                    "line moved {:.1} toward {} against {:.0}% of tickets on {}",
                    net.delta.abs(),
                    line_side,
                    public_share,
                    public_side
                ))
                .with_detail("pattern", "reverse_line_movement")
                .with_detail("public_pct", format!("{public_share:.1}"))
                .with_evidence(evidence),
        ))
    }
}

impl Default for LineMovementProcessor {
    fn default() -> Self {
        Self::new(LineMovementConfig::default())
    }
}

impl SignalProcessor for LineMovementProcessor {
    fn id(&self) -> StrategyId {
        StrategyId::LineMovement
    }

    fn name(&self) -> &str {
        "Line Movement"
    }

    fn description(&self) -> &str {
        "Detects steam moves across books and reverse line movement against the public"
    }

    fn generate_signals(&self, ctx: &GameContext) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        for market in ctx.markets() {
            let steam = match detect_steam(ctx, market, &self.config) {
                Some(steam) => Some(self.steam_signal(ctx, market, &steam)?),
                None => None,
            };
            let reverse = if self.config.detect_reverse {
                self.reverse_signal(ctx, market)?
            } else {
                None
            };

            match (steam, reverse) {
                (Some(mut s), Some(r)) if s.selection == r.selection => {
                    // Both patterns agree
                    s.base_confidence = clamp_confidence(s.base_confidence.max(r.base_confidence) + 0.05);
                    s.details.insert("pattern".into(), "steam+reverse_line_movement".into());
                    signals.push(s);
                }
                // Steam wins a disagreement
                (Some(s), _) => signals.push(s),
                (None, Some(r)) => signals.push(r),
                (None, None) => {}
            }
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::processors::fixtures::{ctx, line, moneyline, pct};
    use rust_decimal_macros::dec;

    #[test]
    fn test_steam_across_three_books() {
        let c = ctx(vec![
            line(MarketType::Total, "circa", 100, dec!(8.5)),
            line(MarketType::Total, "dk", 100, dec!(8.5)),
            line(MarketType::Total, "fanduel", 100, dec!(8.5)),
            line(MarketType::Total, "circa", 90, dec!(9.0)),
            line(MarketType::Total, "dk", 85, dec!(9.0)),
            line(MarketType::Total, "fanduel", 80, dec!(9.5)),
        ]);
        let signals = LineMovementProcessor::default().generate_signals(&c).unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].selection, Selection::Over);
        assert_eq!(signals[0].details.get("pattern").map(String::as_str), Some("steam"));
        assert_eq!(signals[0].line, Some(dec!(9.5)));
        assert!(signals[0].base_confidence >= 0.6);
    }

    #[test]
    fn test_two_books_are_not_steam() {
        let c = ctx(vec![
            line(MarketType::Total, "circa", 100, dec!(8.5)),
            line(MarketType::Total, "dk", 100, dec!(8.5)),
            line(MarketType::Total, "circa", 90, dec!(9.0)),
            line(MarketType::Total, "dk", 85, dec!(9.0)),
        ]);
        assert!(LineMovementProcessor::default().generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_moves_outside_window_are_not_steam() {
        let c = ctx(vec![
            line(MarketType::Spread, "circa", 300, dec!(-3.0)),
            line(MarketType::Spread, "dk", 300, dec!(-3.0)),
            line(MarketType::Spread, "fanduel", 300, dec!(-3.0)),
            line(MarketType::Spread, "circa", 200, dec!(-3.5)),
            line(MarketType::Spread, "dk", 150, dec!(-3.5)),
            line(MarketType::Spread, "fanduel", 100, dec!(-3.5)),
        ]);
        let p = LineMovementProcessor::new(LineMovementConfig {
            detect_reverse: false,
            ..LineMovementConfig::default()
        });
        assert!(p.generate_signals(&c).unwrap().is_empty());
    }

    #[test]
    fn test_reverse_line_movement_on_moneyline() {
        // 75% of tickets on home, yet home shortens from -150 to -130
        let c = ctx(vec![
            moneyline("pinnacle", 240, -150, 130),
            moneyline("pinnacle", 60, -130, 110),
            pct(MarketType::Moneyline, "pinnacle", 55, 75.0, 60.0),
        ]);
        let signals = LineMovementProcessor::default().generate_signals(&c).unwrap();

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.selection, Selection::Away);
        assert_eq!(
            s.details.get("pattern").map(String::as_str),
            Some("reverse_line_movement")
        );
    }

    #[test]
    fn test_line_moving_with_public_is_not_reverse() {
        let c = ctx(vec![
            moneyline("pinnacle", 240, -130, 110),
            moneyline("pinnacle", 60, -150, 130),
            pct(MarketType::Moneyline, "pinnacle", 55, 75.0, 60.0),
        ]);
        assert!(LineMovementProcessor::default().generate_signals(&c).unwrap().is_empty());
    }
}
