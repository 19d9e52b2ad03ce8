#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sharpline::adapters::Dataset;
use sharpline::domain::{Game, MarketType, OddsRecord};

pub const BOOKS: [&str; 4] = ["pinnacle", "circa", "draftkings", "fanduel"];

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap()
}

pub fn at(game_start: DateTime<Utc>, minutes_before: i64) -> DateTime<Utc> {
    game_start - Duration::minutes(minutes_before)
}

pub fn pct_record(
    game: &Game,
    market: MarketType,
    book: &str,
    minutes_before: i64,
    bet: f64,
    money: f64,
) -> OddsRecord {
    OddsRecord::builder(&game.id, market, book, at(game.start_time, minutes_before))
        .percentages(bet, money)
        .build()
        .unwrap()
}

pub fn spread_record(
    game: &Game,
    book: &str,
    minutes_before: i64,
    home_line: Decimal,
    bet: f64,
    money: f64,
) -> OddsRecord {
    OddsRecord::builder(&game.id, MarketType::Spread, book, at(game.start_time, minutes_before))
        .line(home_line)
        .prices(-110, -110)
        .percentages(bet, money)
        .bet_count(800)
        .build()
        .unwrap()
}

pub fn moneyline_record(
    game: &Game,
    book: &str,
    minutes_before: i64,
    home_price: i32,
    away_price: i32,
    bet: f64,
    money: f64,
) -> OddsRecord {
    OddsRecord::builder(&game.id, MarketType::Moneyline, book, at(game.start_time, minutes_before))
        .prices(home_price, away_price)
        .percentages(bet, money)
        .bet_count(1200)
        .build()
        .unwrap()
}

pub fn total_record(game: &Game, book: &str, minutes_before: i64, line: Decimal, bet: f64, money: f64) -> OddsRecord {
    OddsRecord::builder(&game.id, MarketType::Total, book, at(game.start_time, minutes_before))
        .line(line)
        .prices(-110, -110)
        .percentages(bet, money)
        .build()
        .unwrap()
}

/// Two completed games with activity in every market across several books
pub fn rich_dataset() -> Dataset {
    let g1 = Game::new("2024-06-01-NYY-BOS", "NYY", "BOS", start())
        .unwrap()
        .with_outcome(6, 3);
    let g2 = Game::new("2024-06-01-LAD-SF", "LAD", "SF", start() + Duration::hours(2))
        .unwrap()
        .with_outcome(2, 5);

    let mut odds = Vec::new();
    for (i, book) in BOOKS.iter().enumerate() {
        let skew = i as f64;
        for minutes in [300, 120, 40, 20, 5] {
            // Money drifting to the home side on g1 while tickets stay on the road team
            odds.push(moneyline_record(&g1, book, minutes, -130, 115, 35.0 + skew, 58.0 + skew));
            odds.push(spread_record(
                &g1,
                book,
                minutes,
                if minutes <= 40 { dec!(-1.5) } else { dec!(-1.0) },
                38.0,
                61.0,
            ));
            odds.push(total_record(&g1, book, minutes, dec!(8.5), 72.0 + skew, 70.0));

            // Public hammering the favourite on g2
            odds.push(moneyline_record(&g2, book, minutes, -180, 160, 78.0 + skew, 74.0));
            odds.push(spread_record(&g2, book, minutes, dec!(-1.5), 70.0, 52.0 - skew));
        }
    }
    // Late outlier total at one book
    odds.push(total_record(&g1, "betrivers", 20, dec!(9.5), 60.0, 60.0));

    Dataset {
        games: vec![g1, g2],
        odds,
    }
}
