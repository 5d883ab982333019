//! Zero-guarded arithmetic shared by the risk classifier and the aggregation engine
//!
//! Every division in the analytics path goes through these helpers so a zero
//! denominator always resolves the same way.

/// `numerator / denominator` when the denominator is positive.
///
/// Otherwise the numerator itself is returned, so an all-long bucket reports
/// its long count and an empty bucket reports zero.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        numerator
    } else {
        0.0
    }
}

/// `part / whole * 100` when `whole` is positive, else `0`.
pub fn safe_percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round to cents (2 dp), used for values, PnL, distances and ratios.
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Round to 4 dp, used for position sizes.
pub fn round4(value: f64) -> f64 {
    round_to(value, 4)
}
