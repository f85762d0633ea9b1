//! Static pattern knowledge
//!
//! Curated probability, confidence and trade-bracket figures keyed by pattern
//! code. These are domain constants, not backtest output. The table is injected
//! into the engine at construction and can be replaced wholesale.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::Confidence;
use crate::{ConfigError, ConfigResult};

/// Stable pattern identifier (e.g. `"MORNING_STAR"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternCode(pub &'static str);

impl PatternCode {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PatternCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl serde::Serialize for PatternCode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.0)
    }
}

/// Knowledge entry for one pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Display name
    pub name: String,
    /// Historical success rate, 0..=100
    pub probability: f64,
    pub confidence: Confidence,
    /// Target distance in ATR multiples
    pub target_multiple: f64,
    /// Stop distance in ATR multiples
    pub stop_multiple: f64,
}

impl PatternStats {
    pub fn new(
        name: &str,
        probability: f64,
        confidence: Confidence,
        target_multiple: f64,
        stop_multiple: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            probability,
            confidence,
            target_multiple,
            stop_multiple,
        }
    }
}

// ============================================================
// CODES
// ============================================================

pub mod codes {
    use super::PatternCode;

    // Candlestick
    pub const DOJI: PatternCode = PatternCode("DOJI");
    pub const HAMMER: PatternCode = PatternCode("HAMMER");
    pub const SHOOTING_STAR: PatternCode = PatternCode("SHOOTING_STAR");
    pub const BULLISH_ENGULFING: PatternCode = PatternCode("BULLISH_ENGULFING");
    pub const BEARISH_ENGULFING: PatternCode = PatternCode("BEARISH_ENGULFING");
    pub const MORNING_STAR: PatternCode = PatternCode("MORNING_STAR");
    pub const EVENING_STAR: PatternCode = PatternCode("EVENING_STAR");
    pub const INSIDE_BAR: PatternCode = PatternCode("INSIDE_BAR");
    pub const MARUBOZU: PatternCode = PatternCode("MARUBOZU");

    // Confluence
    pub const CONFLUENCE_SUPPORT: PatternCode = PatternCode("CONFLUENCE_SUPPORT");
    pub const CONFLUENCE_RESISTANCE: PatternCode = PatternCode("CONFLUENCE_RESISTANCE");

    // Divergences and crosses
    pub const RSI_BULLISH_DIVERGENCE: PatternCode = PatternCode("RSI_BULLISH_DIVERGENCE");
    pub const RSI_BEARISH_DIVERGENCE: PatternCode = PatternCode("RSI_BEARISH_DIVERGENCE");
    pub const MACD_BULLISH_DIVERGENCE: PatternCode = PatternCode("MACD_BULLISH_DIVERGENCE");
    pub const MACD_BEARISH_DIVERGENCE: PatternCode = PatternCode("MACD_BEARISH_DIVERGENCE");
    pub const STOCH_BULLISH_DIVERGENCE: PatternCode = PatternCode("STOCH_BULLISH_DIVERGENCE");
    pub const STOCH_BEARISH_DIVERGENCE: PatternCode = PatternCode("STOCH_BEARISH_DIVERGENCE");
    pub const VWAP_BULLISH_DIVERGENCE: PatternCode = PatternCode("VWAP_BULLISH_DIVERGENCE");
    pub const VWAP_BEARISH_DIVERGENCE: PatternCode = PatternCode("VWAP_BEARISH_DIVERGENCE");
    pub const MACD_BULLISH_CROSS: PatternCode = PatternCode("MACD_BULLISH_CROSS");
    pub const MACD_BEARISH_CROSS: PatternCode = PatternCode("MACD_BEARISH_CROSS");
    pub const STOCH_OVERSOLD_CROSS: PatternCode = PatternCode("STOCH_OVERSOLD_CROSS");
    pub const STOCH_OVERBOUGHT_CROSS: PatternCode = PatternCode("STOCH_OVERBOUGHT_CROSS");
    pub const VWAP_RECLAIM: PatternCode = PatternCode("VWAP_RECLAIM");
    pub const VWAP_REJECTION: PatternCode = PatternCode("VWAP_REJECTION");
    pub const GOLDEN_CROSS: PatternCode = PatternCode("GOLDEN_CROSS");
    pub const DEATH_CROSS: PatternCode = PatternCode("DEATH_CROSS");

    // Breakouts and structures
    pub const BREAKOUT_VOLUME: PatternCode = PatternCode("BREAKOUT_VOLUME");
    pub const BREAKDOWN_VOLUME: PatternCode = PatternCode("BREAKDOWN_VOLUME");
    pub const INSIDE_BAR_BREAKOUT: PatternCode = PatternCode("INSIDE_BAR_BREAKOUT");
    pub const CUP_AND_HANDLE: PatternCode = PatternCode("CUP_AND_HANDLE");
    pub const TRIPLE_TOP: PatternCode = PatternCode("TRIPLE_TOP");
    pub const TRIPLE_BOTTOM: PatternCode = PatternCode("TRIPLE_BOTTOM");
    pub const ASCENDING_TRIANGLE: PatternCode = PatternCode("ASCENDING_TRIANGLE");

    // Composite strategies
    pub const SWING_PULLBACK: PatternCode = PatternCode("SWING_PULLBACK");
    pub const GAP_BREAKOUT: PatternCode = PatternCode("GAP_BREAKOUT");
}

// ============================================================
// KNOWLEDGE BASE
// ============================================================

/// Read-only lookup of pattern statistics
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    entries: BTreeMap<PatternCode, PatternStats>,
    /// Probability points added when a pattern is confirmed by a level
    pub confluence_bonus: f64,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    /// Empty table: every matcher finds nothing
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            confluence_bonus: 0.0,
        }
    }

    /// The curated default table
    pub fn builtin() -> Self {
        use codes::*;
        use Confidence::{High, Low, Medium};

        let table = [
            (DOJI, PatternStats::new("Doji", 50.0, Low, 1.0, 1.0)),
            (HAMMER, PatternStats::new("Hammer", 60.0, Medium, 2.0, 1.0)),
            (SHOOTING_STAR, PatternStats::new("Shooting Star", 59.0, Medium, 2.0, 1.0)),
            (BULLISH_ENGULFING, PatternStats::new("Bullish Engulfing", 63.0, Medium, 2.0, 1.0)),
            (BEARISH_ENGULFING, PatternStats::new("Bearish Engulfing", 62.0, Medium, 2.0, 1.0)),
            (MORNING_STAR, PatternStats::new("Morning Star", 68.0, High, 2.5, 1.0)),
            (EVENING_STAR, PatternStats::new("Evening Star", 67.0, High, 2.5, 1.0)),
            (INSIDE_BAR, PatternStats::new("Inside Bar", 52.0, Low, 1.5, 1.0)),
            (MARUBOZU, PatternStats::new("Marubozu", 56.0, Medium, 2.0, 1.0)),
            (RSI_BULLISH_DIVERGENCE, PatternStats::new("RSI Bullish Divergence", 64.0, Medium, 2.0, 1.0)),
            (RSI_BEARISH_DIVERGENCE, PatternStats::new("RSI Bearish Divergence", 63.0, Medium, 2.0, 1.0)),
            (MACD_BULLISH_DIVERGENCE, PatternStats::new("MACD Bullish Divergence", 62.0, Medium, 2.0, 1.0)),
            (MACD_BEARISH_DIVERGENCE, PatternStats::new("MACD Bearish Divergence", 61.0, Medium, 2.0, 1.0)),
            (STOCH_BULLISH_DIVERGENCE, PatternStats::new("Stochastic Bullish Divergence", 58.0, Medium, 2.0, 1.0)),
            (STOCH_BEARISH_DIVERGENCE, PatternStats::new("Stochastic Bearish Divergence", 57.0, Medium, 2.0, 1.0)),
            (VWAP_BULLISH_DIVERGENCE, PatternStats::new("VWAP Bullish Divergence", 55.0, Low, 1.5, 1.0)),
            (VWAP_BEARISH_DIVERGENCE, PatternStats::new("VWAP Bearish Divergence", 54.0, Low, 1.5, 1.0)),
            (MACD_BULLISH_CROSS, PatternStats::new("MACD Bullish Cross", 58.0, Medium, 1.5, 1.0)),
            (MACD_BEARISH_CROSS, PatternStats::new("MACD Bearish Cross", 57.0, Medium, 1.5, 1.0)),
            (STOCH_OVERSOLD_CROSS, PatternStats::new("Stochastic Oversold Cross", 57.0, Medium, 1.5, 1.0)),
            (STOCH_OVERBOUGHT_CROSS, PatternStats::new("Stochastic Overbought Cross", 56.0, Medium, 1.5, 1.0)),
            (VWAP_RECLAIM, PatternStats::new("VWAP Reclaim", 55.0, Low, 1.5, 1.0)),
            (VWAP_REJECTION, PatternStats::new("VWAP Rejection", 54.0, Low, 1.5, 1.0)),
            (GOLDEN_CROSS, PatternStats::new("Golden Cross", 66.0, High, 3.0, 1.5)),
            (DEATH_CROSS, PatternStats::new("Death Cross", 64.0, High, 3.0, 1.5)),
            (BREAKOUT_VOLUME, PatternStats::new("Volume Breakout", 65.0, High, 2.5, 1.0)),
            (BREAKDOWN_VOLUME, PatternStats::new("Volume Breakdown", 63.0, High, 2.5, 1.0)),
            (INSIDE_BAR_BREAKOUT, PatternStats::new("Inside Bar Volume Breakout", 61.0, Medium, 2.0, 1.0)),
            (CUP_AND_HANDLE, PatternStats::new("Cup and Handle", 68.0, High, 1.0, 1.0)),
            (TRIPLE_TOP, PatternStats::new("Triple Top", 65.0, High, 1.0, 1.0)),
            (TRIPLE_BOTTOM, PatternStats::new("Triple Bottom", 66.0, High, 1.0, 1.0)),
            (ASCENDING_TRIANGLE, PatternStats::new("Ascending Triangle", 67.0, High, 1.0, 1.0)),
            (SWING_PULLBACK, PatternStats::new("Swing Pullback", 70.0, High, 3.0, 1.5)),
            (GAP_BREAKOUT, PatternStats::new("Gap Breakout", 62.0, Medium, 2.0, 1.0)),
        ];

        Self {
            entries: table.into_iter().collect(),
            confluence_bonus: 8.0,
        }
    }

    /// Add or replace an entry
    pub fn insert(&mut self, code: PatternCode, stats: PatternStats) -> Option<PatternStats> {
        self.entries.insert(code, stats)
    }

    pub fn remove(&mut self, code: PatternCode) -> Option<PatternStats> {
        self.entries.remove(&code)
    }

    #[inline]
    pub fn get(&self, code: PatternCode) -> Option<&PatternStats> {
        self.entries.get(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatternCode, &PatternStats)> {
        self.entries.iter()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=100.0).contains(&self.confluence_bonus) {
            return Err(ConfigError::OutOfRange {
                field: "confluence_bonus",
                value: self.confluence_bonus,
                min: 0.0,
                max: 100.0,
            });
        }
        for (code, stats) in &self.entries {
            if !(0.0..=100.0).contains(&stats.probability) {
                return Err(ConfigError::Invalid(format!(
                    "{code}: probability {} outside 0..=100",
                    stats.probability
                )));
            }
            let positive = |m: f64| m.is_finite() && m > 0.0;
            if !positive(stats.target_multiple) || !positive(stats.stop_multiple) {
                return Err(ConfigError::Invalid(format!(
                    "{code}: trade multiples must be finite and > 0"
                )));
            }
        }
        Ok(())
    }
}
