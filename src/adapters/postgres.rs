use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::{GameOutcomeProvider, OddsHistoryProvider};
use crate::domain::{Game, GameOutcome, MarketType, OddsRecord};
use crate::error::{Result, SharplineError};

/// PostgreSQL storage adapter over the `games` and `odds_records` tables
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SharplineError::DataUnavailable(format!("migration failed: {e}")))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== Writes ====================

    /// Insert or update a game and its final score
    #[instrument(skip(self, game), fields(game_id = %game.id))]
    pub async fn upsert_game(&self, game: &Game) -> Result<()> {
        game.validate()?;
        sqlx::query(
            r#"
            INSERT INTO games (id, home_team, away_team, start_time, home_score, away_score)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                home_team = EXCLUDED.home_team,
                away_team = EXCLUDED.away_team,
                start_time = EXCLUDED.start_time,
                home_score = EXCLUDED.home_score,
                away_score = EXCLUDED.away_score
            "#,
        )
        .bind(&game.id)
        .bind(&game.home_team)
        .bind(&game.away_team)
        .bind(game.start_time)
        .bind(game.outcome.map(|o| o.home_score as i32))
        .bind(game.outcome.map(|o| o.away_score as i32))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert odds records in a single transaction
    pub async fn insert_odds_records(&self, records: &[OddsRecord]) -> Result<()> {
        for record in records {
            record.validate()?;
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO odds_records
                    (game_id, market, sportsbook, bet_pct, money_pct, line,
                     primary_price, opposing_price, bet_count, observed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&record.game_id)
            .bind(record.market.as_str())
            .bind(&record.sportsbook)
            .bind(record.bet_pct)
            .bind(record.money_pct)
            .bind(record.line)
            .bind(record.primary_price)
            .bind(record.opposing_price)
            .bind(record.bet_count.map(|n| n as i32))
            .bind(record.observed_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = records.len(), "inserted odds records");
        Ok(())
    }
}

// ==================== Row mapping ====================

fn non_negative(value: Option<i32>, column: &str) -> Result<Option<u32>> {
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                SharplineError::InvalidInput(format!("negative {column} in database: {v}"))
            })
        })
        .transpose()
}

fn game_from_row(row: &PgRow) -> Result<Game> {
    let home_score = non_negative(row.try_get("home_score")?, "home_score")?;
    let away_score = non_negative(row.try_get("away_score")?, "away_score")?;
    let outcome = match (home_score, away_score) {
        (Some(home_score), Some(away_score)) => Some(GameOutcome {
            home_score,
            away_score,
        }),
        _ => None,
    };

    let game = Game {
        id: row.try_get("id")?,
        home_team: row.try_get("home_team")?,
        away_team: row.try_get("away_team")?,
        start_time: row.try_get("start_time")?,
        outcome,
    };
    game.validate()?;
    Ok(game)
}

fn record_from_row(row: &PgRow) -> Result<OddsRecord> {
    let market: String = row.try_get("market")?;
    let line: Option<Decimal> = row.try_get("line")?;
    let record = OddsRecord {
        game_id: row.try_get("game_id")?,
        market: market.parse()?,
        sportsbook: row.try_get("sportsbook")?,
        bet_pct: row.try_get("bet_pct")?,
        money_pct: row.try_get("money_pct")?,
        line,
        primary_price: row.try_get("primary_price")?,
        opposing_price: row.try_get("opposing_price")?,
        bet_count: non_negative(row.try_get("bet_count")?, "bet_count")?,
        observed_at: row.try_get("observed_at")?,
    };
    record.validate()?;
    Ok(record)
}

#[async_trait]
impl OddsHistoryProvider for PostgresStore {
    async fn get_odds_records(
        &self,
        game_id: &str,
        market: MarketType,
        before: DateTime<Utc>,
    ) -> Result<Vec<OddsRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT game_id, market, sportsbook, bet_pct, money_pct, line,
                   primary_price, opposing_price, bet_count, observed_at
            FROM odds_records
            WHERE game_id = $1 AND market = $2 AND observed_at < $3
            ORDER BY observed_at ASC, sportsbook ASC
            "#,
        )
        .bind(game_id)
        .bind(market.as_str())
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl GameOutcomeProvider for PostgresStore {
    async fn get_completed_games(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Game>> {
        let rows = sqlx::query(
            r#"
            SELECT id, home_team, away_team, start_time, home_score, away_score
            FROM games
            WHERE start_time >= $1 AND start_time < $2
            ORDER BY start_time ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let games = rows.iter().map(game_from_row).collect::<Result<Vec<_>>>()?;
        debug!(count = games.len(), %start, %end, "fetched games");
        Ok(games)
    }
}
