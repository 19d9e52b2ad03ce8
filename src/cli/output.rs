//! Output formatting for `sharpline` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::ScoredSignal;
use crate::strategy::StrategyInfo;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

/// Print a single Serialize item as pretty JSON.
pub fn print_json<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
pub struct StrategyRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub description: String,
}

impl From<&StrategyInfo> for StrategyRow {
    fn from(info: &StrategyInfo) -> Self {
        Self {
            id: info.id.to_string(),
            name: info.name.clone(),
            status: info.status.to_string(),
            description: info.description.clone(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct SignalRow {
    pub game: String,
    pub market: String,
    pub pick: String,
    pub strategy: String,
    pub confidence: String,
    pub level: String,
    pub timing: String,
    pub conflict: String,
    pub reason: String,
}

impl From<&ScoredSignal> for SignalRow {
    fn from(s: &ScoredSignal) -> Self {
        let pick = match s.signal.line {
            Some(line) => format!("{} {}", s.selection(), line),
            None => s.selection().to_string(),
        };
        Self {
            game: s.game_id().to_string(),
            market: s.market().to_string(),
            pick,
            strategy: s.strategy().to_string(),
            confidence: format!("{:.3}", s.final_confidence),
            level: s.level.to_string(),
            timing: s.timing.to_string(),
            conflict: s.conflict.to_string(),
            reason: s.signal.reason.clone(),
        }
    }
}
