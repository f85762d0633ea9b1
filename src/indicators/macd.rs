//! MACD: fast/slow EMA spread with an EMA signal line

use serde::Serialize;

use super::moving_average::{ema, ema_of};
use super::Line;

/// MACD line, signal line and histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdLines {
    pub line: Line,
    pub signal: Line,
    pub histogram: Line,
}

/// EMA(fast) - EMA(slow), signal = EMA(signal) of the line.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdLines {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let line: Line = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema_of(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdLines {
        line,
        signal: signal_line,
        histogram,
    }
}
