//! Command-line interface
//!
//! sharpline strategies                      - List registered strategies
//! sharpline signals --data <file>           - Generate signals for upcoming games
//! sharpline backtest --start <d> --end <d>  - Grade strategies over completed games

pub mod commands;
pub mod output;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use output::OutputMode;

#[derive(Parser, Debug)]
#[command(name = "sharpline")]
#[command(author, version, about = "Sports betting signal generation and backtesting")]
pub struct Cli {
    /// Configuration directory (default.toml plus $SHARPLINE_ENV overrides)
    #[arg(long, global = true, default_value = "config")]
    pub config: PathBuf,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered strategies and their status
    Strategies,

    /// Run the orchestrator over a dataset
    Signals {
        /// JSON dataset with `games` and `odds`
        #[arg(long)]
        data: PathBuf,

        /// Only use odds observed up to this instant (RFC 3339, default now)
        #[arg(long)]
        cutoff: Option<DateTime<Utc>>,

        /// Comma-separated strategy ids (default: all registered)
        #[arg(long, value_delimiter = ',')]
        strategies: Vec<String>,

        /// Restrict to one game
        #[arg(long)]
        game: Option<String>,

        /// Abort after this many seconds and print partial results
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Backtest strategies over completed games
    Backtest {
        /// JSON dataset with `games` and `odds`
        #[arg(long, conflicts_with = "database_url")]
        data: Option<PathBuf>,

        /// PostgreSQL URL (falls back to database.url in config)
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// First day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Comma-separated strategy ids (default: all registered)
        #[arg(long, value_delimiter = ',')]
        strategies: Vec<String>,

        /// Abort after this many seconds and print partial results
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signals() {
        let cli = Cli::parse_from([
            "sharpline",
            "signals",
            "--data",
            "games.json",
            "--strategies",
            "sharp_action,steam",
            "--cutoff",
            "2024-06-01T22:00:00Z",
        ]);
        match cli.command {
            Commands::Signals {
                strategies, cutoff, ..
            } => {
                assert_eq!(strategies, vec!["sharp_action", "steam"]);
                assert!(cutoff.is_some());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_backtest_with_json() {
        let cli = Cli::parse_from([
            "sharpline",
            "--json",
            "backtest",
            "--data",
            "games.json",
            "--start",
            "2024-06-01",
            "--end",
            "2024-06-30",
        ]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Backtest { .. }));
    }
}
