//! Simple and exponential moving averages
//!
//! Both families work over `Option` inputs so they can be chained onto other
//! indicator lines (MACD signal, stochastic %D) that start undefined.

use super::Line;

/// SMA over raw values. Defined from index `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Line {
    let wrapped: Line = values.iter().copied().map(Some).collect();
    sma_of(&wrapped, period)
}

/// SMA over a line: defined where the last `period` entries are all defined.
pub fn sma_of(values: &[Option<f64>], period: usize) -> Line {
    if period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let sum = window.iter().try_fold(0.0, |acc, v| v.map(|v| acc + v))?;
            Some(sum / period as f64)
        })
        .collect()
}

/// EMA over raw values, seeded with the SMA of the first window.
pub fn ema(values: &[f64], period: usize) -> Line {
    let wrapped: Line = values.iter().copied().map(Some).collect();
    ema_of(&wrapped, period)
}

/// EMA over a line.
///
/// The seed is the mean of the first `period` consecutive defined entries; the
/// output is undefined before it and wherever the input is undefined after it.
pub fn ema_of(values: &[Option<f64>], period: usize) -> Line {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut run = 0usize;
    let mut prev: Option<f64> = None;

    for (i, value) in values.iter().enumerate() {
        match (prev, value) {
            (Some(p), Some(v)) => {
                let next = v * k + p * (1.0 - k);
                out[i] = Some(next);
                prev = Some(next);
            }
            (Some(_), None) => {}
            (None, Some(_)) => {
                run += 1;
                if run == period {
                    let window = &values[i + 1 - period..=i];
                    let seed = window.iter().flatten().sum::<f64>() / period as f64;
                    out[i] = Some(seed);
                    prev = Some(seed);
                }
            }
            (None, None) => run = 0,
        }
    }

    out
}
