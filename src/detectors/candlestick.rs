//! Candlestick shape rules
//!
//! Shapes: Doji, Hammer, Shooting Star, Bullish/Bearish Engulfing,
//! Morning/Evening Star, Inside Bar, Marubozu.
//!
//! Each rule is a pure predicate over 1-3 bars of body/shadow/range ratios.
//! Rules fire independently, so several shapes may match overlapping windows.

use super::helpers::{self, check_fraction};
use super::MatchInput;
use crate::knowledge::{codes, PatternCode};
use crate::pattern::{DetectedPattern, PatternDetail};
use crate::{ConfigResult, Direction, MarketContext, OHLCVExt, OHLCV};

/// Raw shape hit before trade levels and knowledge are attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeMatch {
    pub code: PatternCode,
    pub direction: Direction,
    /// Shape quality 0.0..=1.0
    pub strength: f64,
    pub start_index: usize,
    pub end_index: usize,
}

/// One candlestick shape
pub trait CandlestickRule {
    fn code(&self) -> PatternCode;

    /// Bars needed up to and including the detection index
    fn min_bars(&self) -> usize;

    /// Test the shape ending at `index`
    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, ctx: &MarketContext)
        -> Option<ShapeMatch>;

    fn validate_config(&self) -> ConfigResult<()> {
        Ok(())
    }
}

fn shape(
    code: PatternCode,
    direction: Direction,
    strength: f64,
    start_index: usize,
    end_index: usize,
) -> ShapeMatch {
    ShapeMatch {
        code,
        direction,
        strength: strength.clamp(0.0, 1.0),
        start_index,
        end_index,
    }
}

impl_with_defaults!(
    DojiRule,
    HammerRule,
    ShootingStarRule,
    BullishEngulfingRule,
    BearishEngulfingRule,
    MorningStarRule,
    EveningStarRule,
    InsideBarRule,
    MarubozuRule,
);

// ============================================================
// SINGLE BAR
// ============================================================

/// Open and close nearly equal
#[derive(Debug, Clone, Copy)]
pub struct DojiRule {
    pub body_max: f64,
}

impl Default for DojiRule {
    fn default() -> Self {
        Self {
            body_max: helpers::DOJI_BODY_MAX,
        }
    }
}

impl CandlestickRule for DojiRule {
    fn code(&self) -> PatternCode {
        codes::DOJI
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let ratio = bars.get(index)?.body_ratio()?;
        if ratio > self.body_max {
            return None;
        }
        let strength = if self.body_max > 0.0 {
            1.0 - ratio / self.body_max * 0.5
        } else {
            1.0
        };
        Some(shape(self.code(), Direction::Neutral, strength, index, index))
    }

    fn validate_config(&self) -> ConfigResult<()> {
        check_fraction("doji.body_max", self.body_max)
    }
}

/// Small body on top of a long lower shadow, outside an uptrend
#[derive(Debug, Clone, Copy)]
pub struct HammerRule {
    pub body_max: f64,
    pub shadow_min: f64,
    pub opposite_max: f64,
}

impl Default for HammerRule {
    fn default() -> Self {
        Self {
            body_max: helpers::PIN_BODY_MAX,
            shadow_min: helpers::PIN_SHADOW_MIN,
            opposite_max: helpers::PIN_OPPOSITE_MAX,
        }
    }
}

impl CandlestickRule for HammerRule {
    fn code(&self) -> PatternCode {
        codes::HAMMER
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, ctx: &MarketContext) -> Option<ShapeMatch> {
        let bar = bars.get(index)?;
        let body = bar.body_ratio()?;
        let lower = bar.lower_shadow_ratio()?;
        let upper = bar.upper_shadow_ratio()?;

        if ctx.trend.is_up() || body > self.body_max || lower < self.shadow_min {
            return None;
        }
        if upper > self.opposite_max {
            return None;
        }

        Some(shape(self.code(), Direction::Bullish, lower, index, index))
    }

    fn validate_config(&self) -> ConfigResult<()> {
        check_fraction("hammer.body_max", self.body_max)?;
        check_fraction("hammer.shadow_min", self.shadow_min)?;
        check_fraction("hammer.opposite_max", self.opposite_max)
    }
}

/// Small body under a long upper shadow, outside a downtrend
#[derive(Debug, Clone, Copy)]
pub struct ShootingStarRule {
    pub body_max: f64,
    pub shadow_min: f64,
    pub opposite_max: f64,
}

impl Default for ShootingStarRule {
    fn default() -> Self {
        Self {
            body_max: helpers::PIN_BODY_MAX,
            shadow_min: helpers::PIN_SHADOW_MIN,
            opposite_max: helpers::PIN_OPPOSITE_MAX,
        }
    }
}

impl CandlestickRule for ShootingStarRule {
    fn code(&self) -> PatternCode {
        codes::SHOOTING_STAR
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, ctx: &MarketContext) -> Option<ShapeMatch> {
        let bar = bars.get(index)?;
        let body = bar.body_ratio()?;
        let upper = bar.upper_shadow_ratio()?;
        let lower = bar.lower_shadow_ratio()?;

        if ctx.trend.is_down() || body > self.body_max || upper < self.shadow_min {
            return None;
        }
        if lower > self.opposite_max {
            return None;
        }

        Some(shape(self.code(), Direction::Bearish, upper, index, index))
    }

    fn validate_config(&self) -> ConfigResult<()> {
        check_fraction("shooting_star.body_max", self.body_max)?;
        check_fraction("shooting_star.shadow_min", self.shadow_min)?;
        check_fraction("shooting_star.opposite_max", self.opposite_max)
    }
}

/// Full-bodied candle with almost no shadows, direction by colour
#[derive(Debug, Clone, Copy)]
pub struct MarubozuRule {
    pub body_min: f64,
}

impl Default for MarubozuRule {
    fn default() -> Self {
        Self {
            body_min: helpers::MARUBOZU_BODY_MIN,
        }
    }
}

impl CandlestickRule for MarubozuRule {
    fn code(&self) -> PatternCode {
        codes::MARUBOZU
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let bar = bars.get(index)?;
        let ratio = bar.body_ratio()?;
        if ratio < self.body_min {
            return None;
        }
        let direction = if bar.is_bullish() {
            Direction::Bullish
        } else if bar.is_bearish() {
            Direction::Bearish
        } else {
            return None;
        };
        Some(shape(self.code(), direction, ratio, index, index))
    }

    fn validate_config(&self) -> ConfigResult<()> {
        check_fraction("marubozu.body_min", self.body_min)
    }
}

// ============================================================
// TWO BAR
// ============================================================

/// Bearish candle whose body is swallowed by the next bullish body
#[derive(Debug, Clone, Copy, Default)]
pub struct BullishEngulfingRule;

impl CandlestickRule for BullishEngulfingRule {
    fn code(&self) -> PatternCode {
        codes::BULLISH_ENGULFING
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let prev = bars.get(index.checked_sub(1)?)?;
        let cur = bars.get(index)?;

        if !prev.is_bearish() || !cur.is_bullish() {
            return None;
        }
        if cur.open() > prev.close() || cur.close() < prev.open() || cur.body() <= prev.body() {
            return None;
        }

        let strength = 1.0 - prev.body() / cur.body() * 0.5;
        Some(shape(self.code(), Direction::Bullish, strength, index - 1, index))
    }
}

/// Bullish candle whose body is swallowed by the next bearish body
#[derive(Debug, Clone, Copy, Default)]
pub struct BearishEngulfingRule;

impl CandlestickRule for BearishEngulfingRule {
    fn code(&self) -> PatternCode {
        codes::BEARISH_ENGULFING
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let prev = bars.get(index.checked_sub(1)?)?;
        let cur = bars.get(index)?;

        if !prev.is_bullish() || !cur.is_bearish() {
            return None;
        }
        if cur.open() < prev.close() || cur.close() > prev.open() || cur.body() <= prev.body() {
            return None;
        }

        let strength = 1.0 - prev.body() / cur.body() * 0.5;
        Some(shape(self.code(), Direction::Bearish, strength, index - 1, index))
    }
}

/// Bar whose whole range sits strictly inside the previous bar's range
#[derive(Debug, Clone, Copy, Default)]
pub struct InsideBarRule;

impl CandlestickRule for InsideBarRule {
    fn code(&self) -> PatternCode {
        codes::INSIDE_BAR
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let mother = bars.get(index.checked_sub(1)?)?;
        let inside = bars.get(index)?;

        if inside.high() >= mother.high() || inside.low() <= mother.low() {
            return None;
        }

        let strength = 1.0 - inside.range() / mother.range();
        Some(shape(self.code(), Direction::Neutral, strength, index - 1, index))
    }
}

// ============================================================
// THREE BAR
// ============================================================

/// Long bearish candle, small star gapping below its close, bullish recovery
/// past the first body's midpoint
#[derive(Debug, Clone, Copy)]
pub struct MorningStarRule {
    pub first_body_min: f64,
    pub star_body_factor: f64,
    pub confirm_body_factor: f64,
}

impl Default for MorningStarRule {
    fn default() -> Self {
        Self {
            first_body_min: helpers::STAR_FIRST_BODY_MIN,
            star_body_factor: helpers::STAR_BODY_FACTOR,
            confirm_body_factor: helpers::STAR_CONFIRM_FACTOR,
        }
    }
}

impl CandlestickRule for MorningStarRule {
    fn code(&self) -> PatternCode {
        codes::MORNING_STAR
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let first = bars.get(index.checked_sub(2)?)?;
        let star = bars.get(index - 1)?;
        let third = bars.get(index)?;

        if !first.is_bearish() || first.body_ratio()? < self.first_body_min {
            return None;
        }
        if star.body() > first.body() * self.star_body_factor || star.body_top() >= first.close() {
            return None;
        }
        let midpoint = (first.open() + first.close()) / 2.0;
        if !third.is_bullish() || third.close() <= midpoint {
            return None;
        }
        if third.body() < first.body() * self.confirm_body_factor {
            return None;
        }

        let recovery = (third.close() - first.close()) / first.body();
        Some(shape(self.code(), Direction::Bullish, 0.5 + recovery * 0.5, index - 2, index))
    }

    fn validate_config(&self) -> ConfigResult<()> {
        check_fraction("morning_star.first_body_min", self.first_body_min)?;
        check_fraction("morning_star.star_body_factor", self.star_body_factor)?;
        check_fraction("morning_star.confirm_body_factor", self.confirm_body_factor)
    }
}

/// Long bullish candle, small star gapping above its close, bearish drop
/// past the first body's midpoint
#[derive(Debug, Clone, Copy)]
pub struct EveningStarRule {
    pub first_body_min: f64,
    pub star_body_factor: f64,
    pub confirm_body_factor: f64,
}

impl Default for EveningStarRule {
    fn default() -> Self {
        Self {
            first_body_min: helpers::STAR_FIRST_BODY_MIN,
            star_body_factor: helpers::STAR_BODY_FACTOR,
            confirm_body_factor: helpers::STAR_CONFIRM_FACTOR,
        }
    }
}

impl CandlestickRule for EveningStarRule {
    fn code(&self) -> PatternCode {
        codes::EVENING_STAR
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], index: usize, _ctx: &MarketContext) -> Option<ShapeMatch> {
        let first = bars.get(index.checked_sub(2)?)?;
        let star = bars.get(index - 1)?;
        let third = bars.get(index)?;

        if !first.is_bullish() || first.body_ratio()? < self.first_body_min {
            return None;
        }
        if star.body() > first.body() * self.star_body_factor || star.body_bottom() <= first.close() {
            return None;
        }
        let midpoint = (first.open() + first.close()) / 2.0;
        if !third.is_bearish() || third.close() >= midpoint {
            return None;
        }
        if third.body() < first.body() * self.confirm_body_factor {
            return None;
        }

        let decline = (first.close() - third.close()) / first.body();
        Some(shape(self.code(), Direction::Bearish, 0.5 + decline * 0.5, index - 2, index))
    }

    fn validate_config(&self) -> ConfigResult<()> {
        check_fraction("evening_star.first_body_min", self.first_body_min)?;
        check_fraction("evening_star.star_body_factor", self.star_body_factor)?;
        check_fraction("evening_star.confirm_body_factor", self.confirm_body_factor)
    }
}

// ============================================================
// DISPATCH
// ============================================================

macro_rules! define_candlestick_rules {
    (
        $(
            $variant:ident($rule:ty)
        ),* $(,)?
    ) => {
        /// All candlestick rules - enum dispatch
        #[derive(Debug, Clone)]
        pub enum CandlestickDetector {
            $($variant($rule)),*
        }

        impl CandlestickDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                index: usize,
                ctx: &MarketContext,
            ) -> Option<ShapeMatch> {
                match self {
                    $(Self::$variant(r) => CandlestickRule::detect(r, bars, index, ctx)),*
                }
            }

            #[inline]
            pub fn code(&self) -> PatternCode {
                match self {
                    $(Self::$variant(r) => CandlestickRule::code(r)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(r) => CandlestickRule::min_bars(r)),*
                }
            }

            pub fn validate_config(&self) -> ConfigResult<()> {
                match self {
                    $(Self::$variant(r) => CandlestickRule::validate_config(r)),*
                }
            }
        }

        impl CandlestickMatcher {
            /// Every shape with default thresholds
            pub fn with_defaults() -> Self {
                Self {
                    detectors: vec![$(CandlestickDetector::$variant(<$rule>::with_defaults())),*],
                }
            }
        }
    };
}

define_candlestick_rules! {
    Doji(DojiRule),
    Hammer(HammerRule),
    ShootingStar(ShootingStarRule),
    BullishEngulfing(BullishEngulfingRule),
    BearishEngulfing(BearishEngulfingRule),
    MorningStar(MorningStarRule),
    EveningStar(EveningStarRule),
    InsideBar(InsideBarRule),
    Marubozu(MarubozuRule),
}

/// Runs every rule at every bar
#[derive(Debug, Clone)]
pub struct CandlestickMatcher {
    detectors: Vec<CandlestickDetector>,
}

impl CandlestickMatcher {
    pub fn new(detectors: Vec<CandlestickDetector>) -> Self {
        Self { detectors }
    }

    pub fn detectors(&self) -> &[CandlestickDetector] {
        &self.detectors
    }

    pub fn validate_config(&self) -> ConfigResult<()> {
        self.detectors.iter().try_for_each(|d| d.validate_config())
    }

    /// Raw shape hits in bar order, then rule order
    pub fn shapes(&self, input: &MatchInput<'_>) -> Vec<ShapeMatch> {
        let bars = input.bars();
        let mut out = Vec::new();

        for index in 0..bars.len() {
            let ctx = input.context(index);
            for detector in &self.detectors {
                if index + 1 < detector.min_bars() {
                    continue;
                }
                if let Some(m) = detector.detect(bars, index, &ctx) {
                    out.push(m);
                }
            }
        }

        out
    }

    /// Candlestick patterns with ATR-bracketed trade levels
    pub fn scan(&self, input: &MatchInput<'_>) -> Vec<DetectedPattern> {
        self.shapes(input)
            .into_iter()
            .filter_map(|m| to_pattern(input, &m))
            .collect()
    }
}

fn to_pattern(input: &MatchInput<'_>, m: &ShapeMatch) -> Option<DetectedPattern> {
    let detail = PatternDetail::Candlestick {
        bars: m.end_index - m.start_index + 1,
        shape_strength: m.strength,
    };
    let pattern = input.emit_atr(detail, m.code, m.direction, (m.start_index, m.end_index))?;

    let ctx = input.context(m.end_index);
    let mut evidence = vec![
        format!("{} completed at bar {}", pattern.name, m.end_index),
        format!("Shape strength {:.0}%", m.strength * 100.0),
        format!("Prior trend: {}", ctx.trend.as_str()),
    ];
    if let Some(avg) = ctx.avg_volume {
        let volume = input.bars()[m.end_index].volume;
        evidence.push(format!("Volume {:.1}x the trailing average", volume / avg));
    }

    let confirmation = match m.direction {
        Direction::Bullish => vec![
            format!("Next bar closes above {:.2}", pattern.entry_price),
            format!("Price holds above stop {:.2}", pattern.stop_loss),
        ],
        Direction::Bearish => vec![
            format!("Next bar closes below {:.2}", pattern.entry_price),
            format!("Price stays below stop {:.2}", pattern.stop_loss),
        ],
        Direction::Neutral => vec!["Wait for a directional close out of the pattern range".into()],
    };

    Some(pattern.with_evidence(evidence).with_confirmation(confirmation))
}
