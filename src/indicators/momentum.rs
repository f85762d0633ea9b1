//! RSI and stochastic oscillator

use serde::Serialize;

use super::moving_average::sma_of;
use super::Line;
use crate::series::Bar;

/// Wilder RSI over closes.
///
/// Indices `0..period` are undefined. A window without losses reads 100, which
/// also covers a flat series.
pub fn rsi(closes: &[f64], period: usize) -> Line {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let change = |i: usize| closes[i] - closes[i - 1];

    let (mut avg_gain, mut avg_loss) = (1..=period).fold((0.0, 0.0), |(g, l), i| {
        let d = change(i);
        (g + d.max(0.0), l + (-d).max(0.0))
    });
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let p = period as f64;
    for i in period + 1..closes.len() {
        let d = change(i);
        avg_gain = (avg_gain * (p - 1.0) + d.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-d).max(0.0)) / p;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Stochastic %K and its %D smoothing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StochasticLines {
    pub k: Line,
    pub d: Line,
}

/// %K over `k_period` bars, %D = SMA(`d_period`) of %K.
///
/// A window with zero high-low range reads 50.
pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticLines {
    let k: Line = (0..bars.len())
        .map(|i| {
            if k_period == 0 || i + 1 < k_period {
                return None;
            }
            let window = &bars[i + 1 - k_period..=i];
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let highest = window
                .iter()
                .map(|b| b.high)
                .fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;
            if range <= 0.0 {
                return Some(50.0);
            }
            Some(((bars[i].close - lowest) / range * 100.0).clamp(0.0, 100.0))
        })
        .collect();
    let d = sma_of(&k, d_period);
    StochasticLines { k, d }
}
