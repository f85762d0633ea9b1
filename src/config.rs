//! Engine configuration and per-call analysis options
//!
//! Every tunable threshold of the pipeline lives here, grouped per stage. All
//! structs deserialize with `#[serde(default)]`, so a partial JSON/TOML document
//! only overrides what it names. Validation happens once in
//! [`EngineBuilder::build`](crate::EngineBuilder::build), before any analysis.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::indicators::{Indicator, IndicatorSelection};
use crate::{ConfigError, ConfigResult, Period, Ratio};

// ============================================================
// MATCHER CATEGORIES
// ============================================================

/// Pattern matcher families that can be enabled per call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatcherCategory {
    Candlestick,
    Confluence,
    Combination,
    CompositeSwing,
    CompositeIntraday,
}

impl MatcherCategory {
    pub const ALL: [MatcherCategory; 5] = [
        MatcherCategory::Candlestick,
        MatcherCategory::Confluence,
        MatcherCategory::Combination,
        MatcherCategory::CompositeSwing,
        MatcherCategory::CompositeIntraday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatcherCategory::Candlestick => "candlestick",
            MatcherCategory::Confluence => "confluence",
            MatcherCategory::Combination => "combination",
            MatcherCategory::CompositeSwing => "composite-swing",
            MatcherCategory::CompositeIntraday => "composite-intraday",
        }
    }
}

impl FromStr for MatcherCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        MatcherCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

// ============================================================
// ANALYSIS OPTIONS
// ============================================================

/// Per-call selection of matcher categories and indicators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub categories: BTreeSet<MatcherCategory>,
    pub indicators: IndicatorSelection,
}

impl Default for AnalysisOptions {
    /// All matcher categories and the standard indicator set
    fn default() -> Self {
        Self {
            categories: MatcherCategory::ALL.into_iter().collect(),
            indicators: IndicatorSelection::standard(&IndicatorParams::default()),
        }
    }
}

impl AnalysisOptions {
    pub fn new(
        categories: impl IntoIterator<Item = MatcherCategory>,
        indicators: IndicatorSelection,
    ) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            indicators,
        }
    }

    /// Parse category and indicator names, failing on the first unknown one.
    pub fn from_names<C, I>(categories: C, indicators: I) -> ConfigResult<Self>
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let categories = categories
            .into_iter()
            .map(|name| name.as_ref().parse::<MatcherCategory>())
            .collect::<ConfigResult<BTreeSet<_>>>()?;
        let indicators = indicators
            .into_iter()
            .map(|name| name.as_ref().parse::<Indicator>())
            .collect::<ConfigResult<BTreeSet<_>>>()?;
        Ok(Self {
            categories,
            indicators: IndicatorSelection::from(indicators),
        })
    }

    #[inline]
    pub fn is_enabled(&self, category: MatcherCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Reject selections the engine cannot compute
    pub fn validate(&self) -> ConfigResult<()> {
        for indicator in self.indicators.iter() {
            if let Indicator::Sma(0) | Indicator::Ema(0) = indicator {
                return Err(ConfigError::InvalidValue("moving average period must be > 0"));
            }
        }
        Ok(())
    }

    /// Selected indicators plus everything an enabled matcher reads
    pub fn required_indicators(&self, config: &EngineConfig) -> IndicatorSelection {
        let mut required = self.indicators.clone();
        for category in &self.categories {
            match category {
                MatcherCategory::Candlestick | MatcherCategory::Confluence => {}
                MatcherCategory::Combination => {
                    let c = &config.combination;
                    required.extend([
                        Indicator::Rsi,
                        Indicator::Macd,
                        Indicator::Stochastic,
                        Indicator::Vwap,
                        Indicator::Sma(c.trend_fast.get()),
                        Indicator::Sma(c.trend_slow.get()),
                    ]);
                }
                MatcherCategory::CompositeSwing => {
                    let s = &config.swing;
                    required.extend([
                        Indicator::Rsi,
                        Indicator::Macd,
                        Indicator::Sma(s.trend_fast.get()),
                        Indicator::Sma(s.trend_slow.get()),
                    ]);
                }
                MatcherCategory::CompositeIntraday => {
                    required.extend([
                        Indicator::Rsi,
                        Indicator::Sma(config.intraday.trend_period.get()),
                    ]);
                }
            }
        }
        required
    }
}

// ============================================================
// ENGINE CONFIG
// ============================================================

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indicators: IndicatorParams,
    pub levels: LevelParams,
    pub context: ContextParams,
    pub confluence: ConfluenceParams,
    pub combination: CombinationParams,
    pub swing: SwingParams,
    pub intraday: IntradayParams,
    pub ranking: RankingParams,
    pub overlay: OverlayParams,
    pub sessions: SessionParams,
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.indicators.validate()?;
        self.levels.validate()?;
        self.context.validate()?;
        self.combination.validate()?;
        self.swing.validate()?;
        self.intraday.validate()?;
        self.ranking.validate()?;
        self.overlay.validate()?;
        self.sessions.offset()?;
        Ok(())
    }
}

/// Upper bound for every window, radius and bar count in the config
pub const MAX_WINDOW: usize = 100_000;

fn check_window(field: &'static str, value: Period) -> ConfigResult<()> {
    if value.get() > MAX_WINDOW {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.get() as f64,
            min: 1.0,
            max: MAX_WINDOW as f64,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: f64::MIN_POSITIVE,
            max: f64::MAX,
        });
    }
    Ok(())
}

fn check_percent(field: &'static str, value: f64) -> ConfigResult<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(())
}

/// VWAP accumulation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VwapAnchor {
    /// One running sum over the whole series
    #[default]
    Series,
    /// Reset at the first bar of every session
    Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    /// SMA periods in the standard selection
    pub sma_periods: Vec<Period>,
    /// EMA periods in the standard selection
    pub ema_periods: Vec<Period>,
    pub rsi_period: Period,
    pub macd_fast: Period,
    pub macd_slow: Period,
    pub macd_signal: Period,
    pub bollinger_period: Period,
    /// Band width in standard deviations
    pub bollinger_width: f64,
    pub stochastic_k: Period,
    pub stochastic_d: Period,
    pub vwap_anchor: VwapAnchor,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_periods: vec![
                Period::new_const(20),
                Period::new_const(50),
                Period::new_const(200),
            ],
            ema_periods: vec![Period::new_const(12), Period::new_const(26)],
            rsi_period: Period::new_const(14),
            macd_fast: Period::new_const(12),
            macd_slow: Period::new_const(26),
            macd_signal: Period::new_const(9),
            bollinger_period: Period::new_const(20),
            bollinger_width: 2.0,
            stochastic_k: Period::new_const(14),
            stochastic_d: Period::new_const(3),
            vwap_anchor: VwapAnchor::Series,
        }
    }
}

impl IndicatorParams {
    fn validate(&self) -> ConfigResult<()> {
        if self.macd_fast >= self.macd_slow {
            return Err(ConfigError::Invalid(format!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                self.macd_fast.get(),
                self.macd_slow.get()
            )));
        }
        for &period in self.sma_periods.iter().chain(&self.ema_periods) {
            check_window("indicators.sma_periods/ema_periods", period)?;
        }
        check_window("indicators.rsi_period", self.rsi_period)?;
        check_window("indicators.macd_slow", self.macd_slow)?;
        check_window("indicators.macd_signal", self.macd_signal)?;
        check_window("indicators.bollinger_period", self.bollinger_period)?;
        check_window("indicators.stochastic_k", self.stochastic_k)?;
        check_window("indicators.stochastic_d", self.stochastic_d)?;
        check_positive("bollinger_width", self.bollinger_width)
    }
}

/// Support/resistance detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelParams {
    /// Bars on each side an extremum must dominate
    pub radius: Period,
    /// Relative price band within which extrema cluster
    pub tolerance: Ratio,
    /// Clusters with fewer touches are discarded
    pub min_touches: Period,
}

impl Default for LevelParams {
    fn default() -> Self {
        Self {
            radius: Period::new_const(2),
            tolerance: Ratio::new_const(0.01),
            min_touches: Period::new_const(2),
        }
    }
}

impl LevelParams {
    fn validate(&self) -> ConfigResult<()> {
        check_window("levels.radius", self.radius)?;
        check_window("levels.min_touches", self.min_touches)?;
        if self.tolerance.get() >= 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "levels.tolerance",
                value: self.tolerance.get(),
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

/// Trailing windows for per-bar market context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    pub trend_period: Period,
    pub candle_period: Period,
    pub atr_period: Period,
    pub volume_period: Period,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            trend_period: Period::new_const(14),
            candle_period: Period::new_const(10),
            atr_period: Period::new_const(14),
            volume_period: Period::new_const(20),
        }
    }
}

impl ContextParams {
    fn validate(&self) -> ConfigResult<()> {
        check_window("context.trend_period", self.trend_period)?;
        check_window("context.candle_period", self.candle_period)?;
        check_window("context.atr_period", self.atr_period)?;
        check_window("context.volume_period", self.volume_period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceParams {
    /// Max relative distance between the pattern close and the level
    pub tolerance: Ratio,
}

impl Default for ConfluenceParams {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.01),
        }
    }
}

/// Cross-indicator and multi-bar structure matchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinationParams {
    /// Neighbourhood radius for swing highs/lows
    pub pivot_radius: Period,
    pub min_divergence_span: Period,
    pub max_divergence_span: Period,
    pub trend_fast: Period,
    pub trend_slow: Period,
    pub volume_window: Period,
    /// Breakout volume must reach this multiple of the trailing average
    pub volume_multiple: f64,
    pub stochastic_oversold: f64,
    pub stochastic_overbought: f64,
    /// Max relative spread of "equal" peaks/troughs
    pub structure_tolerance: Ratio,
    /// Max bars spanned by a triple top/bottom or triangle
    pub structure_window: Period,
    /// Min relative height of a structure
    pub min_structure_depth: Ratio,
    pub cup_min_span: Period,
    pub cup_max_span: Period,
    pub cup_rim_tolerance: Ratio,
    pub cup_max_depth: Ratio,
    pub handle_min_bars: Period,
    pub handle_max_bars: Period,
}

impl Default for CombinationParams {
    fn default() -> Self {
        Self {
            pivot_radius: Period::new_const(3),
            min_divergence_span: Period::new_const(5),
            max_divergence_span: Period::new_const(40),
            trend_fast: Period::new_const(50),
            trend_slow: Period::new_const(200),
            volume_window: Period::new_const(20),
            volume_multiple: 1.5,
            stochastic_oversold: 20.0,
            stochastic_overbought: 80.0,
            structure_tolerance: Ratio::new_const(0.015),
            structure_window: Period::new_const(60),
            min_structure_depth: Ratio::new_const(0.02),
            cup_min_span: Period::new_const(10),
            cup_max_span: Period::new_const(60),
            cup_rim_tolerance: Ratio::new_const(0.03),
            cup_max_depth: Ratio::new_const(0.5),
            handle_min_bars: Period::new_const(2),
            handle_max_bars: Period::new_const(10),
        }
    }
}

impl CombinationParams {
    fn validate(&self) -> ConfigResult<()> {
        for (field, period) in [
            ("combination.pivot_radius", self.pivot_radius),
            ("combination.max_divergence_span", self.max_divergence_span),
            ("combination.trend_slow", self.trend_slow),
            ("combination.volume_window", self.volume_window),
            ("combination.structure_window", self.structure_window),
            ("combination.cup_max_span", self.cup_max_span),
            ("combination.handle_max_bars", self.handle_max_bars),
        ] {
            check_window(field, period)?;
        }
        if self.min_divergence_span > self.max_divergence_span {
            return Err(ConfigError::Invalid(
                "min_divergence_span exceeds max_divergence_span".into(),
            ));
        }
        if self.cup_min_span > self.cup_max_span {
            return Err(ConfigError::Invalid("cup_min_span exceeds cup_max_span".into()));
        }
        if self.handle_min_bars > self.handle_max_bars {
            return Err(ConfigError::Invalid(
                "handle_min_bars exceeds handle_max_bars".into(),
            ));
        }
        if self.trend_fast >= self.trend_slow {
            return Err(ConfigError::Invalid(
                "trend_fast must be shorter than trend_slow".into(),
            ));
        }
        check_positive("volume_multiple", self.volume_multiple)?;
        check_percent("stochastic_oversold", self.stochastic_oversold)?;
        check_percent("stochastic_overbought", self.stochastic_overbought)?;
        if self.stochastic_oversold >= self.stochastic_overbought {
            return Err(ConfigError::Invalid(
                "stochastic_oversold must be below stochastic_overbought".into(),
            ));
        }
        Ok(())
    }
}

/// Swing-trade composite signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingParams {
    pub trend_fast: Period,
    pub trend_slow: Period,
    /// Close must sit within this distance of the fast SMA or a support
    pub location_tolerance: Ratio,
    /// RSI must be strictly below this
    pub rsi_max: f64,
    /// RSI must have risen on each of this many consecutive bars
    pub rising_bars: Period,
}

impl Default for SwingParams {
    fn default() -> Self {
        Self {
            trend_fast: Period::new_const(50),
            trend_slow: Period::new_const(200),
            location_tolerance: Ratio::new_const(0.02),
            rsi_max: 40.0,
            rising_bars: Period::new_const(3),
        }
    }
}

impl SwingParams {
    fn validate(&self) -> ConfigResult<()> {
        if self.trend_fast >= self.trend_slow {
            return Err(ConfigError::Invalid(
                "swing trend_fast must be shorter than trend_slow".into(),
            ));
        }
        check_window("swing.trend_slow", self.trend_slow)?;
        check_window("swing.rising_bars", self.rising_bars)?;
        check_percent("swing.rsi_max", self.rsi_max)
    }
}

/// Intraday gap-breakout composite signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntradayParams {
    /// Minimum open-over-previous-close gap
    pub min_gap: Ratio,
    pub volume_multiple: f64,
    pub volume_window: Period,
    pub rsi_min: f64,
    pub rsi_max: f64,
    /// Close must be above the SMA of this period
    pub trend_period: Period,
}

impl Default for IntradayParams {
    fn default() -> Self {
        Self {
            min_gap: Ratio::new_const(0.003),
            volume_multiple: 1.2,
            volume_window: Period::new_const(20),
            rsi_min: 40.0,
            rsi_max: 80.0,
            trend_period: Period::new_const(20),
        }
    }
}

impl IntradayParams {
    fn validate(&self) -> ConfigResult<()> {
        check_window("intraday.volume_window", self.volume_window)?;
        check_window("intraday.trend_period", self.trend_period)?;
        check_positive("intraday.volume_multiple", self.volume_multiple)?;
        check_percent("intraday.rsi_min", self.rsi_min)?;
        check_percent("intraday.rsi_max", self.rsi_max)?;
        if self.rsi_min > self.rsi_max {
            return Err(ConfigError::Invalid("intraday rsi_min exceeds rsi_max".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingParams {
    /// Patterns kept after ranking
    pub top_k: usize,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl RankingParams {
    fn validate(&self) -> ConfigResult<()> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue("ranking.top_k must be > 0"));
        }
        Ok(())
    }
}

/// Overlay geometry and label placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayParams {
    /// How far price lines extend past the pattern end, in bars
    pub extend_bars: f64,
    /// Label width per character, in bars
    pub char_width: f64,
    /// Label height as a share of the series price span
    pub label_height_ratio: Ratio,
    pub vertical_attempts: usize,
    pub horizontal_attempts: usize,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self {
            extend_bars: 10.0,
            char_width: 0.6,
            label_height_ratio: Ratio::new_const(0.04),
            vertical_attempts: 4,
            horizontal_attempts: 4,
        }
    }
}

impl OverlayParams {
    fn validate(&self) -> ConfigResult<()> {
        check_positive("overlay.extend_bars", self.extend_bars)?;
        check_positive("overlay.char_width", self.char_width)?;
        if self.label_height_ratio.get() <= 0.0 {
            return Err(ConfigError::InvalidValue("label_height_ratio must be > 0"));
        }
        Ok(())
    }
}

/// Session boundaries, used by the intraday matcher and session VWAP
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Exchange offset from UTC in minutes
    pub utc_offset_minutes: i32,
}

impl SessionParams {
    pub fn offset(&self) -> ConfigResult<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::OutOfRange {
                field: "utc_offset_minutes",
                value: f64::from(self.utc_offset_minutes),
                min: -1439.0,
                max: 1439.0,
            })
    }
}
