//! Common helper functions for pattern detection
//!
//! Shape thresholds shared by the candlestick rules plus the series and
//! indicator comparisons used by the combination and composite matchers.

use crate::series::Bar;
use crate::{ConfigError, ConfigResult};

pub use crate::indicators::value_at;

// ============================================================
// SHAPE THRESHOLDS (fractions of the bar range)
// ============================================================

/// Doji: body <= range * DOJI_BODY_MAX
pub const DOJI_BODY_MAX: f64 = 0.1;
/// Hammer / shooting star: small body
pub const PIN_BODY_MAX: f64 = 0.35;
/// Hammer / shooting star: dominant shadow
pub const PIN_SHADOW_MIN: f64 = 0.6;
/// Hammer / shooting star: opposite shadow stays short
pub const PIN_OPPOSITE_MAX: f64 = 0.15;
/// Star patterns: first candle body must be at least this share of its range
pub const STAR_FIRST_BODY_MIN: f64 = 0.5;
/// Star patterns: star body <= first body * STAR_BODY_FACTOR
pub const STAR_BODY_FACTOR: f64 = 0.3;
/// Star patterns: third body >= first body * STAR_CONFIRM_FACTOR
pub const STAR_CONFIRM_FACTOR: f64 = 0.5;
/// Marubozu: body >= range * MARUBOZU_BODY_MIN
pub const MARUBOZU_BODY_MIN: f64 = 0.95;

/// Validate a rule threshold that is a fraction of something
pub fn check_fraction(field: &'static str, value: f64) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

// ============================================================
// SERIES HELPERS
// ============================================================

/// Mean volume of the `window` bars before `at` (exclusive).
///
/// None until `window` prior bars exist or when they carry no volume at all.
#[inline]
pub fn trailing_avg_volume(bars: &[Bar], at: usize, window: usize) -> Option<f64> {
    if window == 0 || at < window || at > bars.len() {
        return None;
    }
    let avg = bars[at - window..at].iter().map(|b| b.volume).sum::<f64>() / window as f64;
    (avg > 0.0).then_some(avg)
}

/// Volume at `at` is at least `multiple` × the trailing average
#[inline]
pub fn volume_surge(bars: &[Bar], at: usize, window: usize, multiple: f64) -> Option<f64> {
    let avg = trailing_avg_volume(bars, at, window)?;
    let ratio = bars.get(at)?.volume / avg;
    (ratio >= multiple).then_some(ratio)
}

/// Lowest low over `bars[from..=to]`
pub fn lowest_low(bars: &[Bar], from: usize, to: usize) -> Option<f64> {
    bars.get(from..=to)?
        .iter()
        .map(|b| b.low)
        .min_by(|a, b| a.total_cmp(b))
}

/// Highest high over `bars[from..=to]`
pub fn highest_high(bars: &[Bar], from: usize, to: usize) -> Option<f64> {
    bars.get(from..=to)?
        .iter()
        .map(|b| b.high)
        .max_by(|a, b| a.total_cmp(b))
}

// ============================================================
// LINE COMPARISONS
// ============================================================

/// `a` moved from at-or-below `b` to strictly above it between `i - 1` and `i`
#[inline]
pub fn crossed_above(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> bool {
    match pair(a, b, i) {
        Some(((a0, a1), (b0, b1))) => a0 <= b0 && a1 > b1,
        None => false,
    }
}

/// `a` moved from at-or-above `b` to strictly below it between `i - 1` and `i`
#[inline]
pub fn crossed_below(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> bool {
    match pair(a, b, i) {
        Some(((a0, a1), (b0, b1))) => a0 >= b0 && a1 < b1,
        None => false,
    }
}

type Pair = (f64, f64);

fn pair(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> Option<(Pair, Pair)> {
    let prev = i.checked_sub(1)?;
    let a0 = (*a.get(prev)?)?;
    let a1 = (*a.get(i)?)?;
    let b0 = (*b.get(prev)?)?;
    let b1 = (*b.get(i)?)?;
    Some(((a0, a1), (b0, b1)))
}

/// Line increased strictly on each of the `bars` steps ending at `i`
pub fn strictly_rising(line: &[Option<f64>], i: usize, bars: usize) -> bool {
    if bars == 0 || i < bars || i >= line.len() {
        return false;
    }
    line[i - bars..=i]
        .windows(2)
        .all(|w| matches!((w[0], w[1]), (Some(a), Some(b)) if b > a))
}

/// Relative spread (max - min) / mean of a set of prices
pub fn relative_spread(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    (max - min) / mean.abs()
}
