//! Series normalizer
//!
//! Validates an OHLCV sequence and freezes it into an indexed [`Series`]. Bar
//! indices are the coordinate system used by every downstream stage.

use chrono::{DateTime, Datelike, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::{InputError, OHLCV};

const MS_PER_DAY: i64 = 86_400_000;

/// One OHLCV sample. Timestamp is Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Copy any OHLCV value into an owned bar
    pub fn from_ohlcv<T: OHLCV>(bar: &T) -> Self {
        Self::new(
            bar.timestamp(),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume(),
        )
    }

    /// Check the single-bar invariants. `index` is only used for error reporting.
    pub fn validate(&self, index: usize) -> Result<(), InputError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(InputError::NonFinite { index, field });
            }
        }
        if self.volume < 0.0 {
            return Err(InputError::NegativeVolume {
                index,
                volume: self.volume,
            });
        }
        if self.high < self.low {
            return Err(InputError::InvalidBar {
                index,
                reason: "high < low",
            });
        }
        if self.high < self.open.max(self.close) {
            return Err(InputError::InvalidBar {
                index,
                reason: "high below open/close",
            });
        }
        if self.low > self.open.min(self.close) {
            return Err(InputError::InvalidBar {
                index,
                reason: "low above open/close",
            });
        }
        Ok(())
    }
}

impl OHLCV for Bar {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Validated, time-ordered bars. Read-only once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    /// Validate and index the given bars.
    ///
    /// Fails on the first malformed bar or on a timestamp that does not strictly
    /// increase. Gaps in time are accepted as-is.
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Result<Self, InputError> {
        let mut out: Vec<Bar> = Vec::with_capacity(bars.len());

        for (index, raw) in bars.iter().enumerate() {
            let bar = Bar::from_ohlcv(raw);
            bar.validate(index)?;

            if let Some(prev) = out.last() {
                if bar.timestamp == prev.timestamp {
                    return Err(InputError::DuplicateTimestamp {
                        index,
                        timestamp: bar.timestamp,
                    });
                }
                if bar.timestamp < prev.timestamp {
                    return Err(InputError::NonMonotonicTimestamp {
                        index,
                        previous: prev.timestamp,
                        current: bar.timestamp,
                    });
                }
            }
            out.push(bar);
        }

        Ok(Self { bars: out })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Lowest low and highest high over the whole series
    pub fn price_bounds(&self) -> Option<(f64, f64)> {
        let first = self.bars.first()?;
        Some(self.bars.iter().fold((first.low, first.high), |(lo, hi), b| {
            (lo.min(b.low), hi.max(b.high))
        }))
    }

    /// Session key per bar: the calendar day of the timestamp in `offset`.
    pub fn session_keys(&self, offset: FixedOffset) -> Vec<i64> {
        self.bars
            .iter()
            .map(|bar| session_key(bar.timestamp, offset))
            .collect()
    }

    /// True where a bar opens a new session. The first bar always does.
    pub fn session_starts(&self, offset: FixedOffset) -> Vec<bool> {
        let keys = self.session_keys(offset);
        keys.iter()
            .enumerate()
            .map(|(i, key)| i == 0 || keys[i - 1] != *key)
            .collect()
    }
}

fn session_key(timestamp: i64, offset: FixedOffset) -> i64 {
    match DateTime::from_timestamp_millis(timestamp) {
        Some(utc) => i64::from(utc.with_timezone(&offset).date_naive().num_days_from_ce()),
        // outside chrono's range: plain day arithmetic
        None => (timestamp + i64::from(offset.local_minus_utc()) * 1_000).div_euclid(MS_PER_DAY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close + 1.0, close - 1.0, close, 100.0)
    }

    #[test]
    fn test_valid_series() {
        let series = Series::from_bars(&[bar(1, 10.0), bar(2, 11.0), bar(5, 12.0)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
        assert_eq!(series.price_bounds(), Some((9.0, 13.0)));
    }

    #[test]
    fn test_duplicate_timestamp() {
        let err = Series::from_bars(&[bar(1, 10.0), bar(1, 11.0)]).unwrap_err();
        assert_eq!(
            err,
            InputError::DuplicateTimestamp {
                index: 1,
                timestamp: 1
            }
        );
    }

    #[test]
    fn test_non_monotonic_timestamp() {
        let err = Series::from_bars(&[bar(5, 10.0), bar(3, 11.0)]).unwrap_err();
        assert!(matches!(err, InputError::NonMonotonicTimestamp { index: 1, .. }));
    }

    #[test]
    fn test_negative_volume() {
        let mut b = bar(1, 10.0);
        b.volume = -1.0;
        assert!(matches!(
            Series::from_bars(&[b]),
            Err(InputError::NegativeVolume { index: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_price() {
        let mut b = bar(1, 10.0);
        b.close = f64::NAN;
        assert_eq!(
            Series::from_bars(&[b]).unwrap_err(),
            InputError::NonFinite {
                index: 0,
                field: "close"
            }
        );
    }

    #[test]
    fn test_high_below_close() {
        let b = Bar::new(1, 10.0, 10.5, 9.0, 11.0, 1.0);
        assert!(matches!(
            Series::from_bars(&[b]),
            Err(InputError::InvalidBar { index: 0, .. })
        ));
    }

    #[test]
    fn test_session_starts() {
        let hour = 3_600_000;
        let day = 24 * hour;
        let series = Series::from_bars(&[
            bar(day + 12 * hour, 10.0),
            bar(day + 13 * hour, 10.0),
            bar(2 * day + 12 * hour, 10.0),
            bar(2 * day + 13 * hour, 10.0),
        ])
        .unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(series.session_starts(utc), vec![true, false, true, false]);

        // 13:00 UTC is already the next day at UTC+11
        let sydney = FixedOffset::east_opt(11 * 3600).unwrap();
        assert_eq!(series.session_starts(sydney), vec![true, true, false, true]);
    }
}
