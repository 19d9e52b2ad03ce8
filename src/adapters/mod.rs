//! Data providers consumed by the orchestrator and backtester
//!
//! The engine never owns storage. It reads odds history and completed games
//! through the two traits below; [`InMemoryStore`] and [`PostgresStore`] are
//! the bundled implementations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Game, MarketType, OddsRecord};
use crate::error::Result;

pub use memory::{Dataset, InMemoryStore};
pub use postgres::PostgresStore;

/// Historical odds lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsHistoryProvider: Send + Sync {
    /// Records for one game and market observed strictly before `before`,
    /// ordered by observation time
    async fn get_odds_records(
        &self,
        game_id: &str,
        market: MarketType,
        before: DateTime<Utc>,
    ) -> Result<Vec<OddsRecord>>;
}

/// Completed games with final scores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameOutcomeProvider: Send + Sync {
    /// Games starting within `[start, end)`. Games without an outcome may be
    /// returned; callers filter them.
    async fn get_completed_games(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Game>>;
}
