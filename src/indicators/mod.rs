//! Indicator engine
//!
//! Every line is aligned 1:1 with the series; leading entries are `None` until
//! the look-back window fills. A window longer than the series yields an all-`None`
//! line rather than an error.

pub mod bollinger;
pub mod macd;
pub mod momentum;
pub mod moving_average;
pub mod volume;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::FixedOffset;
use serde::Serialize;

pub use bollinger::BollingerBands;
pub use macd::MacdLines;
pub use momentum::StochasticLines;

use crate::config::{IndicatorParams, VwapAnchor};
use crate::series::Series;
use crate::ConfigError;

/// One indicator array. `None` = undefined at that index.
pub type Line = Vec<Option<f64>>;

/// Value of a line at `index`, if the line exists and is defined there
#[inline]
pub fn value_at(line: Option<&Line>, index: usize) -> Option<f64> {
    line?.get(index).copied().flatten()
}

// ============================================================
// SELECTION
// ============================================================

/// Indicator families the engine can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    Sma(usize),
    Ema(usize),
    Rsi,
    Macd,
    Bollinger,
    Stochastic,
    Obv,
    Vwap,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Sma(p) => write!(f, "sma{p}"),
            Indicator::Ema(p) => write!(f, "ema{p}"),
            Indicator::Rsi => f.write_str("rsi"),
            Indicator::Macd => f.write_str("macd"),
            Indicator::Bollinger => f.write_str("bollinger"),
            Indicator::Stochastic => f.write_str("stochastic"),
            Indicator::Obv => f.write_str("obv"),
            Indicator::Vwap => f.write_str("vwap"),
        }
    }
}

impl FromStr for Indicator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let parse_period = |digits: &str| match digits.parse::<usize>() {
            Ok(0) => Err(ConfigError::InvalidValue("moving average period must be > 0")),
            Ok(p) => Ok(p),
            Err(_) => Err(ConfigError::UnknownIndicator(s.to_string())),
        };

        match name.as_str() {
            "rsi" => Ok(Indicator::Rsi),
            "macd" => Ok(Indicator::Macd),
            "bollinger" => Ok(Indicator::Bollinger),
            "stochastic" => Ok(Indicator::Stochastic),
            "obv" => Ok(Indicator::Obv),
            "vwap" => Ok(Indicator::Vwap),
            _ => {
                if let Some(digits) = name.strip_prefix("sma") {
                    parse_period(digits).map(Indicator::Sma)
                } else if let Some(digits) = name.strip_prefix("ema") {
                    parse_period(digits).map(Indicator::Ema)
                } else {
                    Err(ConfigError::UnknownIndicator(s.to_string()))
                }
            }
        }
    }
}

impl serde::Serialize for Indicator {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Indicator {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Set of indicators requested for one analysis call
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IndicatorSelection(BTreeSet<Indicator>);

impl IndicatorSelection {
    /// Configured moving averages plus every oscillator and volume indicator
    pub fn standard(params: &IndicatorParams) -> Self {
        let mut set: BTreeSet<Indicator> = params
            .sma_periods
            .iter()
            .map(|p| Indicator::Sma(p.get()))
            .chain(params.ema_periods.iter().map(|p| Indicator::Ema(p.get())))
            .collect();
        set.extend([
            Indicator::Rsi,
            Indicator::Macd,
            Indicator::Bollinger,
            Indicator::Stochastic,
            Indicator::Obv,
            Indicator::Vwap,
        ]);
        Self(set)
    }

    #[inline]
    pub fn contains(&self, indicator: &Indicator) -> bool {
        self.0.contains(indicator)
    }

    pub fn insert(&mut self, indicator: Indicator) -> bool {
        self.0.insert(indicator)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Indicator> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeSet<Indicator>> for IndicatorSelection {
    fn from(set: BTreeSet<Indicator>) -> Self {
        Self(set)
    }
}

impl FromIterator<Indicator> for IndicatorSelection {
    fn from_iter<I: IntoIterator<Item = Indicator>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Indicator> for IndicatorSelection {
    fn extend<I: IntoIterator<Item = Indicator>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

// ============================================================
// INDICATOR SET
// ============================================================

/// Computed indicator lines. Unselected families are absent, never partially filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSet {
    len: usize,
    pub sma: BTreeMap<usize, Line>,
    pub ema: BTreeMap<usize, Line>,
    pub rsi: Option<Line>,
    pub macd: Option<MacdLines>,
    pub bollinger: Option<BollingerBands>,
    pub stochastic: Option<StochasticLines>,
    pub obv: Option<Line>,
    pub vwap: Option<Line>,
}

impl IndicatorSet {
    /// Compute every selected indicator over the series.
    ///
    /// `offset` is the exchange offset used for session VWAP resets.
    pub fn compute(
        series: &Series,
        selection: &IndicatorSelection,
        params: &IndicatorParams,
        offset: FixedOffset,
    ) -> Self {
        let closes = series.closes();
        let bars = series.bars();
        let mut set = IndicatorSet {
            len: series.len(),
            ..Default::default()
        };

        for indicator in selection.iter() {
            match *indicator {
                Indicator::Sma(p) => {
                    set.sma.insert(p, moving_average::sma(&closes, p));
                }
                Indicator::Ema(p) => {
                    set.ema.insert(p, moving_average::ema(&closes, p));
                }
                Indicator::Rsi => {
                    set.rsi = Some(momentum::rsi(&closes, params.rsi_period.get()));
                }
                Indicator::Macd => {
                    set.macd = Some(macd::macd(
                        &closes,
                        params.macd_fast.get(),
                        params.macd_slow.get(),
                        params.macd_signal.get(),
                    ));
                }
                Indicator::Bollinger => {
                    set.bollinger = Some(bollinger::bollinger(
                        &closes,
                        params.bollinger_period.get(),
                        params.bollinger_width,
                    ));
                }
                Indicator::Stochastic => {
                    set.stochastic = Some(momentum::stochastic(
                        bars,
                        params.stochastic_k.get(),
                        params.stochastic_d.get(),
                    ));
                }
                Indicator::Obv => set.obv = Some(volume::obv(bars)),
                Indicator::Vwap => {
                    let resets = match params.vwap_anchor {
                        VwapAnchor::Series => Vec::new(),
                        VwapAnchor::Session => series.session_starts(offset),
                    };
                    set.vwap = Some(volume::vwap(bars, &resets));
                }
            }
        }

        set
    }

    /// Series length every line is aligned to
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn sma(&self, period: usize) -> Option<&Line> {
        self.sma.get(&period)
    }

    pub fn ema(&self, period: usize) -> Option<&Line> {
        self.ema.get(&period)
    }

    pub fn rsi(&self) -> Option<&Line> {
        self.rsi.as_ref()
    }

    pub fn macd(&self) -> Option<&MacdLines> {
        self.macd.as_ref()
    }

    pub fn bollinger(&self) -> Option<&BollingerBands> {
        self.bollinger.as_ref()
    }

    pub fn stochastic(&self) -> Option<&StochasticLines> {
        self.stochastic.as_ref()
    }

    pub fn obv(&self) -> Option<&Line> {
        self.obv.as_ref()
    }

    pub fn vwap(&self) -> Option<&Line> {
        self.vwap.as_ref()
    }

    /// Every computed line with a display name, in a stable order
    pub fn lines(&self) -> Vec<(String, &Line)> {
        let mut out: Vec<(String, &Line)> = Vec::new();
        out.extend(self.sma.iter().map(|(p, l)| (format!("sma{p}"), l)));
        out.extend(self.ema.iter().map(|(p, l)| (format!("ema{p}"), l)));
        if let Some(l) = &self.rsi {
            out.push(("rsi".into(), l));
        }
        if let Some(m) = &self.macd {
            out.push(("macd".into(), &m.line));
            out.push(("macd_signal".into(), &m.signal));
            out.push(("macd_histogram".into(), &m.histogram));
        }
        if let Some(b) = &self.bollinger {
            out.push(("bollinger_middle".into(), &b.middle));
            out.push(("bollinger_upper".into(), &b.upper));
            out.push(("bollinger_lower".into(), &b.lower));
        }
        if let Some(s) = &self.stochastic {
            out.push(("stochastic_k".into(), &s.k));
            out.push(("stochastic_d".into(), &s.d));
        }
        if let Some(l) = &self.obv {
            out.push(("obv".into(), l));
        }
        if let Some(l) = &self.vwap {
            out.push(("vwap".into(), l));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn series(n: usize) -> Series {
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.5).sin() * 4.0;
                Bar::new(i as i64 * 3_600_000, c, c + 1.0, c - 1.0, c, 500.0)
            })
            .collect();
        Series::from_bars(&bars).unwrap()
    }

    #[test]
    fn test_indicator_names() {
        assert_eq!("SMA50".parse::<Indicator>().unwrap(), Indicator::Sma(50));
        assert_eq!("ema12".parse::<Indicator>().unwrap(), Indicator::Ema(12));
        assert_eq!("vwap".parse::<Indicator>().unwrap(), Indicator::Vwap);
        assert!("sma".parse::<Indicator>().is_err());
        assert!("sma0".parse::<Indicator>().is_err());
        assert_eq!(
            "adx".parse::<Indicator>().unwrap_err(),
            ConfigError::UnknownIndicator("adx".into())
        );
        assert_eq!(Indicator::Sma(200).to_string(), "sma200");
    }

    #[test]
    fn test_compute_only_selected() {
        let selection: IndicatorSelection = [Indicator::Rsi, Indicator::Sma(5)].into_iter().collect();
        let set = IndicatorSet::compute(
            &series(30),
            &selection,
            &IndicatorParams::default(),
            utc(),
        );
        assert!(set.rsi().is_some());
        assert!(set.sma(5).is_some());
        assert!(set.sma(20).is_none());
        assert!(set.macd().is_none());
        assert!(set.vwap().is_none());
        assert_eq!(set.lines().len(), 2);
    }

    #[test]
    fn test_all_lines_aligned() {
        let params = IndicatorParams::default();
        let set = IndicatorSet::compute(
            &series(75),
            &IndicatorSelection::standard(&params),
            &params,
            utc(),
        );
        assert_eq!(set.len(), 75);
        for (name, line) in set.lines() {
            assert_eq!(line.len(), 75, "{name}");
        }
        // SMA200 cannot fill on 75 bars
        assert!(set.sma(200).unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_value_at() {
        let line: Line = vec![None, Some(2.0)];
        assert_eq!(value_at(Some(&line), 0), None);
        assert_eq!(value_at(Some(&line), 1), Some(2.0));
        assert_eq!(value_at(Some(&line), 5), None);
        assert_eq!(value_at(None, 1), None);
    }
}
