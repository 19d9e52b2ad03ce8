//! American odds helpers

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Standard -110 pricing assumed when a record carries no price
pub const STANDARD_PRICE: i32 = -110;

/// Largest American price magnitude accepted on a record
pub const MAX_PRICE_MAGNITUDE: u32 = 100_000;

/// Implied win probability of an American price (includes vig)
pub fn implied_probability(price: i32) -> f64 {
    if price < 0 {
        let p = price.unsigned_abs() as f64;
        p / (p + 100.0)
    } else {
        100.0 / (price as f64 + 100.0)
    }
}

/// Profit in units for a one-unit stake that wins at `price`
pub fn profit_per_unit(price: i32) -> Decimal {
    if price < 0 {
        dec!(100) / Decimal::from(price.unsigned_abs())
    } else {
        Decimal::from(price) / dec!(100)
    }
}

pub fn is_underdog(price: i32) -> bool {
    price > 0
}

/// Bookmaker hold implied by a two-way market
pub fn hold(primary: i32, opposing: i32) -> f64 {
    implied_probability(primary) + implied_probability(opposing) - 1.0
}

/// Vig-free probability of the primary side
pub fn no_vig_probability(primary: i32, opposing: i32) -> f64 {
    let a = implied_probability(primary);
    let b = implied_probability(opposing);
    if a + b <= 0.0 {
        return 0.5;
    }
    a / (a + b)
}

/// Price difference in "cents" treating the gap around even money as
/// continuous (-105 to +105 is 10 cents, not 210)
pub fn price_cents(from: i32, to: i32) -> i32 {
    fn normalize(p: i32) -> i32 {
        if p < 0 {
            p + 100
        } else {
            p - 100
        }
    }
    normalize(to) - normalize(from)
}
