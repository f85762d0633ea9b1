//! Detected pattern model
//!
//! Every matcher emits [`DetectedPattern`]. The kind-specific payload lives in
//! the closed [`PatternDetail`] union so each kind carries exactly its own fields.

use serde::{Deserialize, Serialize};

use crate::knowledge::{PatternCode, PatternStats};
use crate::levels::Level;
use crate::Direction;

// ============================================================
// CONFIDENCE
// ============================================================

/// Reliability tier, distinct from the numeric probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Low = 1, Medium = 2, High = 3
    #[inline]
    pub fn tier(self) -> u8 {
        match self {
            Confidence::Low => 1,
            Confidence::Medium => 2,
            Confidence::High => 3,
        }
    }

    /// One tier up; High stays High
    #[inline]
    pub fn raised(self) -> Self {
        match self {
            Confidence::Low => Confidence::Medium,
            Confidence::Medium | Confidence::High => Confidence::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
        }
    }
}

// ============================================================
// TRADE LEVELS
// ============================================================

/// Entry/target/stop bracket with a finite, positive risk/reward
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub target: f64,
    pub stop: f64,
    /// |target - entry| / |entry - stop|
    pub risk_reward: f64,
}

impl TradeLevels {
    /// None when any price is non-finite, the stop or target equals the entry,
    /// or the ratio does not come out finite.
    pub fn new(entry: f64, target: f64, stop: f64) -> Option<Self> {
        if !(entry.is_finite() && target.is_finite() && stop.is_finite()) {
            return None;
        }
        let risk = (entry - stop).abs();
        let reward = (target - entry).abs();
        if risk <= 0.0 || reward <= 0.0 {
            return None;
        }
        let risk_reward = reward / risk;
        (risk_reward.is_finite() && risk_reward > 0.0).then_some(Self {
            entry,
            target,
            stop,
            risk_reward,
        })
    }

    /// Bracket `entry` by ATR multiples. Bearish targets below and stops above;
    /// bullish and neutral the other way round.
    pub fn from_multiples(
        entry: f64,
        atr: f64,
        target_multiple: f64,
        stop_multiple: f64,
        direction: Direction,
    ) -> Option<Self> {
        let sign = if direction.is_bearish() { -1.0 } else { 1.0 };
        Self::new(
            entry,
            entry + sign * target_multiple * atr,
            entry - sign * stop_multiple * atr,
        )
    }
}

// ============================================================
// PATTERN DETAIL
// ============================================================

/// Pattern kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    Candlestick,
    Confluence,
    Combination,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinationFamily {
    Divergence,
    Cross,
    Breakout,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Swing,
    IntradayBreakout,
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum PatternDetail {
    Candlestick {
        /// Bars in the shape (1..=3)
        bars: usize,
        /// Shape quality 0.0..=1.0
        shape_strength: f64,
    },
    Confluence {
        /// Candlestick code that was promoted
        base: PatternCode,
        base_confidence: Confidence,
        level: Level,
    },
    Combination {
        family: CombinationFamily,
    },
    Composite {
        strategy: Strategy,
    },
}

impl PatternDetail {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternDetail::Candlestick { .. } => PatternKind::Candlestick,
            PatternDetail::Confluence { .. } => PatternKind::Confluence,
            PatternDetail::Combination { .. } => PatternKind::Combination,
            PatternDetail::Composite { .. } => PatternKind::Composite,
        }
    }
}

// ============================================================
// DETECTED PATTERN
// ============================================================

/// A matched pattern with scores and trade levels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedPattern {
    pub detail: PatternDetail,
    pub name: String,
    pub code: PatternCode,
    pub signal: Direction,
    pub confidence: Confidence,
    /// 0..=100
    pub probability: f64,
    pub start_index: usize,
    pub end_index: usize,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub risk_reward: f64,
    /// Facts observed on the chart, in detection order
    pub evidence: Vec<String>,
    /// Checklist items a trader should verify
    pub confirmation: Vec<String>,
}

impl DetectedPattern {
    /// Pattern scored from its knowledge entry. `start` must not exceed `end`.
    pub fn new(
        detail: PatternDetail,
        code: PatternCode,
        stats: &PatternStats,
        signal: Direction,
        (start_index, end_index): (usize, usize),
        levels: TradeLevels,
    ) -> Self {
        debug_assert!(start_index <= end_index);
        Self {
            detail,
            name: stats.name.clone(),
            code,
            signal,
            confidence: stats.confidence,
            probability: stats.probability.clamp(0.0, 100.0),
            start_index,
            end_index,
            entry_price: levels.entry,
            target_price: levels.target,
            stop_loss: levels.stop,
            risk_reward: levels.risk_reward,
            evidence: Vec::new(),
            confirmation: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_confirmation(mut self, confirmation: Vec<String>) -> Self {
        self.confirmation = confirmation;
        self
    }

    #[inline]
    pub fn kind(&self) -> PatternKind {
        self.detail.kind()
    }

    /// confidence tier × 100 + probability
    #[inline]
    pub fn score(&self) -> f64 {
        f64::from(self.confidence.tier()) * 100.0 + self.probability
    }

    /// Code of the underlying shape: the promoted candlestick for confluence
    /// patterns, the pattern's own code otherwise.
    pub fn base_code(&self) -> PatternCode {
        match &self.detail {
            PatternDetail::Confluence { base, .. } => *base,
            _ => self.code,
        }
    }

    /// Bar midpoint of the pattern span
    #[inline]
    pub fn mid_index(&self) -> f64 {
        (self.start_index + self.end_index) as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::codes;

    fn stats() -> PatternStats {
        PatternStats::new("Hammer", 60.0, Confidence::Medium, 2.0, 1.0)
    }

    #[test]
    fn test_confidence_raise() {
        assert_eq!(Confidence::Low.raised(), Confidence::Medium);
        assert_eq!(Confidence::Medium.raised(), Confidence::High);
        assert_eq!(Confidence::High.raised(), Confidence::High);
        assert!(Confidence::High > Confidence::Low);
    }

    #[test]
    fn test_trade_levels_reject_degenerate() {
        assert!(TradeLevels::new(100.0, 110.0, 100.0).is_none());
        assert!(TradeLevels::new(100.0, 100.0, 95.0).is_none());
        assert!(TradeLevels::new(f64::NAN, 110.0, 95.0).is_none());
        let levels = TradeLevels::new(100.0, 110.0, 95.0).unwrap();
        assert_eq!(levels.risk_reward, 2.0);
    }

    #[test]
    fn test_trade_levels_from_multiples() {
        let bull = TradeLevels::from_multiples(100.0, 2.0, 2.0, 1.0, Direction::Bullish).unwrap();
        assert_eq!((bull.target, bull.stop), (104.0, 98.0));
        let bear = TradeLevels::from_multiples(100.0, 2.0, 2.0, 1.0, Direction::Bearish).unwrap();
        assert_eq!((bear.target, bear.stop), (96.0, 102.0));
        assert!(TradeLevels::from_multiples(100.0, 0.0, 2.0, 1.0, Direction::Bullish).is_none());
    }

    #[test]
    fn test_score_and_base_code() {
        let levels = TradeLevels::new(100.0, 104.0, 98.0).unwrap();
        let detail = PatternDetail::Candlestick {
            bars: 1,
            shape_strength: 0.8,
        };
        let p = DetectedPattern::new(detail, codes::HAMMER, &stats(), Direction::Bullish, (5, 5), levels);
        assert_eq!(p.score(), 260.0);
        assert_eq!(p.base_code(), codes::HAMMER);
        assert_eq!(p.kind(), PatternKind::Candlestick);
        assert_eq!(p.risk_reward, 2.0);
    }

    #[test]
    fn test_detail_serializes_with_kind_tag() {
        let detail = PatternDetail::Composite {
            strategy: Strategy::Swing,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "Composite");
        assert_eq!(json["strategy"], "Swing");
    }
}
