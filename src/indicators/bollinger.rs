//! Bollinger bands

use serde::Serialize;

use super::moving_average::sma;
use super::Line;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerBands {
    pub middle: Line,
    pub upper: Line,
    pub lower: Line,
}

/// Middle = SMA(period), bands = middle ± width × population stddev of the window.
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> BollingerBands {
    let middle = sma(closes, period);
    let mut upper = vec![None; closes.len()];
    let mut lower = vec![None; closes.len()];

    for (i, mean) in middle.iter().enumerate() {
        let Some(mean) = *mean else { continue };
        let window = &closes[i + 1 - period..=i];
        let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
        let offset = width * variance.sqrt();
        upper[i] = Some(mean + offset);
        lower[i] = Some(mean - offset);
    }

    BollingerBands {
        middle,
        upper,
        lower,
    }
}
