use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::market::{MarketType, OddsRecord, Selection};
use crate::error::{Result, SharplineError};

// =============================================================================
// StrategyId
// =============================================================================

/// Identifier of a built-in signal processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    SharpAction,
    LineMovement,
    Consensus,
    PublicFade,
    LateFlip,
    UnderdogValue,
    BookConflict,
    TimingBased,
    HybridSharp,
}

impl StrategyId {
    pub const ALL: [StrategyId; 9] = [
        StrategyId::SharpAction,
        StrategyId::LineMovement,
        StrategyId::Consensus,
        StrategyId::PublicFade,
        StrategyId::LateFlip,
        StrategyId::UnderdogValue,
        StrategyId::BookConflict,
        StrategyId::TimingBased,
        StrategyId::HybridSharp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharpAction => "sharp_action",
            Self::LineMovement => "line_movement",
            Self::Consensus => "consensus",
            Self::PublicFade => "public_fade",
            Self::LateFlip => "late_flip",
            Self::UnderdogValue => "underdog_value",
            Self::BookConflict => "book_conflict",
            Self::TimingBased => "timing_based",
            Self::HybridSharp => "hybrid_sharp",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = SharplineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        let id = match normalized.as_str() {
            "sharp_action" | "sharp" => Self::SharpAction,
            "line_movement" | "steam" => Self::LineMovement,
            "consensus" => Self::Consensus,
            "public_fade" | "fade" => Self::PublicFade,
            "late_flip" => Self::LateFlip,
            "underdog_value" | "underdog" => Self::UnderdogValue,
            "book_conflict" => Self::BookConflict,
            "timing_based" | "timing" => Self::TimingBased,
            "hybrid_sharp" | "hybrid" => Self::HybridSharp,
            _ => return Err(SharplineError::UnknownStrategy(s.to_string())),
        };
        Ok(id)
    }
}

// =============================================================================
// Timing
// =============================================================================

/// Time-to-game bucket, ordered from earliest to latest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingBucket {
    /// More than 48 hours out
    VeryEarly,
    /// 24-48 hours
    Early,
    /// 12-24 hours
    DayBefore,
    /// 6-12 hours
    SameDay,
    /// 3-6 hours
    Afternoon,
    /// 1-3 hours
    Pregame,
    /// 30-60 minutes
    Late,
    /// 10-30 minutes
    VeryLate,
    /// Under 10 minutes
    UltraLate,
}

impl TimingBucket {
    pub const ALL: [TimingBucket; 9] = [
        TimingBucket::VeryEarly,
        TimingBucket::Early,
        TimingBucket::DayBefore,
        TimingBucket::SameDay,
        TimingBucket::Afternoon,
        TimingBucket::Pregame,
        TimingBucket::Late,
        TimingBucket::VeryLate,
        TimingBucket::UltraLate,
    ];

    pub fn from_minutes_to_start(minutes: i64) -> Self {
        match minutes {
            m if m > 48 * 60 => Self::VeryEarly,
            m if m > 24 * 60 => Self::Early,
            m if m > 12 * 60 => Self::DayBefore,
            m if m > 6 * 60 => Self::SameDay,
            m if m > 3 * 60 => Self::Afternoon,
            m if m > 60 => Self::Pregame,
            m if m > 30 => Self::Late,
            m if m > 10 => Self::VeryLate,
            _ => Self::UltraLate,
        }
    }

    pub fn from_times(observed_at: DateTime<Utc>, start_time: DateTime<Utc>) -> Self {
        Self::from_minutes_to_start((start_time - observed_at).num_minutes())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryEarly => "very_early",
            Self::Early => "early",
            Self::DayBefore => "day_before",
            Self::SameDay => "same_day",
            Self::Afternoon => "afternoon",
            Self::Pregame => "pregame",
            Self::Late => "late",
            Self::VeryLate => "very_late",
            Self::UltraLate => "ultra_late",
        }
    }
}

impl fmt::Display for TimingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Categorical strength reported by a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl SignalStrength {
    /// Bucket how far a measurement cleared its threshold (1.0 = exactly at it)
    pub fn from_ratio(ratio: f64) -> Self {
        match ratio {
            r if r >= 2.0 => Self::VeryStrong,
            r if r >= 1.5 => Self::Strong,
            r if r >= 1.2 => Self::Moderate,
            _ => Self::Weak,
        }
    }
}

/// Candidate recommendation emitted by one processor for one game/market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy: StrategyId,
    pub game_id: String,
    pub market: MarketType,
    pub selection: Selection,
    pub base_confidence: f64,
    pub strength: SignalStrength,
    /// Records that triggered the signal
    pub evidence: Vec<OddsRecord>,
    /// Line from the selection's perspective at recommendation time
    pub line: Option<Decimal>,
    /// American price available for the selection
    pub price: Option<i32>,
    pub generated_at: DateTime<Utc>,
    pub reason: String,
    /// Processor-specific annotations (pattern names, correlation tiers)
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl Signal {
    /// Create a signal; fails when confidence is outside [0, 1] or the
    /// selection does not belong to the market
    pub fn new(
        strategy: StrategyId,
        game_id: impl Into<String>,
        market: MarketType,
        selection: Selection,
        base_confidence: f64,
        generated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let game_id = game_id.into();
        if game_id.trim().is_empty() {
            return Err(SharplineError::InvalidInput("signal without game id".into()));
        }
        if !base_confidence.is_finite() || !(0.0..=1.0).contains(&base_confidence) {
            return Err(SharplineError::InvalidInput(format!(
                "confidence {base_confidence} out of range for {strategy} on {game_id}"
            )));
        }
        if !selection.belongs_to(market) {
            return Err(SharplineError::InvalidInput(format!(
                "selection {selection} is not part of the {market} market"
            )));
        }

        Ok(Self {
            strategy,
            game_id,
            market,
            selection,
            base_confidence,
            strength: SignalStrength::Weak,
            evidence: Vec::new(),
            line: None,
            price: None,
            generated_at,
            reason: String::new(),
            details: BTreeMap::new(),
        })
    }

    pub fn with_strength(mut self, strength: SignalStrength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_line(mut self, line: Option<Decimal>) -> Self {
        self.line = line;
        self
    }

    pub fn with_price(mut self, price: Option<i32>) -> Self {
        self.price = price;
        self
    }

    /// Attach evidence and pick up the selection's line/price from the most
    /// recent record that has them, unless already set
    pub fn with_evidence(mut self, evidence: Vec<OddsRecord>) -> Self {
        let mut latest: Vec<&OddsRecord> = evidence.iter().collect();
        latest.sort_by_key(|r| r.observed_at);
        if self.line.is_none() {
            self.line = latest.iter().rev().find_map(|r| r.line_for(self.selection));
        }
        if self.price.is_none() {
            self.price = latest.iter().rev().find_map(|r| r.price_for(self.selection));
        }
        self.evidence = evidence;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Most recent evidence timestamp, falling back to generation time
    pub fn latest_evidence_at(&self) -> DateTime<Utc> {
        self.evidence
            .iter()
            .map(|r| r.observed_at)
            .max()
            .unwrap_or(self.generated_at)
    }

    /// Distinct sportsbooks in the evidence, sorted
    pub fn books(&self) -> Vec<&str> {
        let mut books: Vec<&str> = self.evidence.iter().map(|r| r.sportsbook.as_str()).collect();
        books.sort_unstable();
        books.dedup();
        books
    }

    /// Tickets backing the observation: latest bet count per book, summed
    pub fn total_bet_volume(&self) -> Option<u32> {
        let mut latest: BTreeMap<&str, &OddsRecord> = BTreeMap::new();
        for rec in &self.evidence {
            let entry = latest.entry(rec.sportsbook.as_str()).or_insert(rec);
            if rec.observed_at > entry.observed_at {
                *entry = rec;
            }
        }
        let counts: Vec<u32> = latest.values().filter_map(|r| r.bet_count).collect();
        if counts.is_empty() {
            None
        } else {
            Some(counts.iter().sum())
        }
    }
}

// =============================================================================
// Scored signal
// =============================================================================

/// Confidence level bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multipliers the scorer applied to the base confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceModifiers {
    pub book: f64,
    pub timing: f64,
    pub volume: f64,
    pub strategy: f64,
}

impl ConfidenceModifiers {
    pub fn product(&self) -> f64 {
        self.book * self.timing * self.volume * self.strategy
    }
}

/// How a signal fared in cross-strategy conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// No other strategy disagreed
    Uncontested,
    /// Won against an opposing recommendation
    Primary,
    /// Lost against a higher-confidence opposing recommendation
    Suppressed,
    /// Tied with an opposing recommendation; both surfaced
    Conflicting,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncontested => "uncontested",
            Self::Primary => "primary",
            Self::Suppressed => "suppressed",
            Self::Conflicting => "conflicting",
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Uncontested | Self::Primary)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal annotated with the weighted confidence model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSignal {
    pub signal: Signal,
    pub final_confidence: f64,
    pub level: ConfidenceLevel,
    pub modifiers: ConfidenceModifiers,
    pub timing: TimingBucket,
    pub conflict: ConflictStatus,
}

impl ScoredSignal {
    pub fn strategy(&self) -> StrategyId {
        self.signal.strategy
    }

    pub fn game_id(&self) -> &str {
        &self.signal.game_id
    }

    pub fn market(&self) -> MarketType {
        self.signal.market
    }

    pub fn selection(&self) -> Selection {
        self.signal.selection
    }
}
