//! In-memory provider backed by a JSON dataset

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{GameOutcomeProvider, OddsHistoryProvider};
use crate::domain::{sort_chronologically, Game, MarketType, OddsRecord};
use crate::error::{Result, SharplineError};

/// File layout: `{ "games": [...], "odds": [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub odds: Vec<OddsRecord>,
}

#[derive(Default)]
struct Inner {
    games: HashMap<String, Game>,
    odds: HashMap<(String, MarketType), Vec<OddsRecord>>,
}

/// Thread-safe store holding games and odds history in memory
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a dataset, validating every game and record
    pub fn from_dataset(dataset: Dataset) -> Result<Self> {
        let mut inner = Inner::default();
        for game in dataset.games {
            game.validate()?;
            inner.games.insert(game.id.clone(), game);
        }
        for record in dataset.odds {
            record.validate()?;
            inner
                .odds
                .entry((record.game_id.clone(), record.market))
                .or_default()
                .push(record);
        }
        for records in inner.odds.values_mut() {
            sort_chronologically(records);
        }

        info!(
            games = inner.games.len(),
            series = inner.odds.len(),
            "loaded in-memory dataset"
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Load a JSON dataset file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            SharplineError::DataUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let dataset: Dataset = serde_json::from_str(&raw)?;
        Self::from_dataset(dataset)
    }

    pub async fn insert_game(&self, game: Game) -> Result<()> {
        game.validate()?;
        self.inner.write().await.games.insert(game.id.clone(), game);
        Ok(())
    }

    pub async fn insert_records(&self, records: Vec<OddsRecord>) -> Result<()> {
        for record in &records {
            record.validate()?;
        }
        let mut inner = self.inner.write().await;
        for record in records {
            let series = inner
                .odds
                .entry((record.game_id.clone(), record.market))
                .or_default();
            series.push(record);
            sort_chronologically(series);
        }
        Ok(())
    }

    pub async fn game(&self, game_id: &str) -> Option<Game> {
        self.inner.read().await.games.get(game_id).cloned()
    }

    /// All games, ordered by start time then id
    pub async fn games(&self) -> Vec<Game> {
        let mut games: Vec<Game> = self.inner.read().await.games.values().cloned().collect();
        games.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        games
    }
}

#[async_trait]
impl OddsHistoryProvider for InMemoryStore {
    async fn get_odds_records(
        &self,
        game_id: &str,
        market: MarketType,
        before: DateTime<Utc>,
    ) -> Result<Vec<OddsRecord>> {
        let inner = self.inner.read().await;
        if !inner.games.contains_key(game_id) {
            return Err(SharplineError::DataUnavailable(format!("unknown game {game_id}")));
        }

        let records: Vec<OddsRecord> = inner
            .odds
            .get(&(game_id.to_string(), market))
            .map(|series| {
                series
                    .iter()
                    .take_while(|r| r.observed_at < before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(game_id, market = %market, count = records.len(), "served odds history");
        Ok(records)
    }
}

#[async_trait]
impl GameOutcomeProvider for InMemoryStore {
    async fn get_completed_games(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Game>> {
        Ok(self
            .games()
            .await
            .into_iter()
            .filter(|g| g.start_time >= start && g.start_time < end)
            .collect())
    }
}
