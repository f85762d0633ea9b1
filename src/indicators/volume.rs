//! Volume-weighted indicators

use super::Line;
use crate::series::Bar;
use crate::OHLCVExt;

/// On-balance volume. Starts at 0 and is defined everywhere.
pub fn obv(bars: &[Bar]) -> Line {
    let mut total = 0.0;
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i > 0 {
                let prev = bars[i - 1].close;
                if bar.close > prev {
                    total += bar.volume;
                } else if bar.close < prev {
                    total -= bar.volume;
                }
            }
            Some(total)
        })
        .collect()
}

/// Cumulative typical-price VWAP.
///
/// `resets[i] == true` restarts the accumulation at bar `i`; pass an empty slice
/// for a single whole-series accumulation. Undefined while accumulated volume is 0.
pub fn vwap(bars: &[Bar], resets: &[bool]) -> Line {
    let mut pv = 0.0;
    let mut volume = 0.0;
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if resets.get(i).copied().unwrap_or(false) {
                pv = 0.0;
                volume = 0.0;
            }
            pv += bar.typical_price() * bar.volume;
            volume += bar.volume;
            (volume > 0.0).then(|| pv / volume)
        })
        .collect()
}
