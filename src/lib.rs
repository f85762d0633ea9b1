//! # chartsignals - Technical Indicator & Pattern Detection Engine
//!
//! Deterministic pipeline turning a time-ordered OHLCV series into indicators,
//! support/resistance levels, ranked chart patterns with trade levels, and
//! renderer-agnostic overlay geometry.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartsignals::prelude::*;
//!
//! let bars: Vec<Bar> = (0..60)
//!     .map(|i| {
//!         let base = 100.0 + (i as f64 * 0.7).sin() * 3.0;
//!         Bar::new(i as i64 * 60_000, base, base + 1.0, base - 1.0, base + 0.3, 1_000.0)
//!     })
//!     .collect();
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let analysis = engine.analyze(&bars, &AnalysisOptions::default()).unwrap();
//!
//! assert_eq!(analysis.indicators.len(), bars.len());
//! assert!(analysis.patterns.len() <= 3);
//! ```
//!
//! Every call recomputes everything from the supplied bars. The engine holds no
//! mutable state, so one [`Engine`] can be shared across threads and
//! [`analyze_parallel`] fans out one series per rayon task.

pub mod config;
pub mod detectors;
pub mod indicators;
pub mod knowledge;
pub mod levels;
pub mod overlay;
pub mod pattern;
pub mod ranker;
pub mod series;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{AnalysisOptions, EngineConfig, MatcherCategory, VwapAnchor},
        // Indicators
        indicators::{Indicator, IndicatorSelection, IndicatorSet, Line},
        // Knowledge
        knowledge::{KnowledgeBase, PatternCode, PatternStats},
        // Levels
        levels::{Level, LevelKind},
        // Overlays
        overlay::{Overlay, OverlayKind, OverlayRole},
        // Patterns
        pattern::{Confidence, DetectedPattern, PatternDetail, PatternKind, TradeLevels},
        // Parallel
        analyze_parallel,
        // Engine
        Analysis,
        // Errors
        AnalysisError,
        // Series
        series::{Bar, Series},
        ConfigError,
        Direction,
        Engine,
        EngineBuilder,
        InputError,
        MarketContext,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        SymbolAnalysis,
        SymbolFailure,
        Trend,
        OHLCV,
    };
}

use chrono::FixedOffset;
use serde::Serialize;

use crate::config::{AnalysisOptions, ContextParams, EngineConfig, MatcherCategory};
use crate::detectors::{
    candlestick::CandlestickMatcher, combination, composite, confluence, MatchInput,
};
use crate::indicators::IndicatorSet;
use crate::knowledge::KnowledgeBase;
use crate::levels::Level;
use crate::overlay::Overlay;
use crate::pattern::DetectedPattern;
use crate::series::Series;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Result alias for configuration-only operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Malformed input series. The whole call is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Non-finite {field} at index {index}")]
    NonFinite { index: usize, field: &'static str },

    #[error("Negative volume {volume} at index {index}")]
    NegativeVolume { index: usize, volume: f64 },

    #[error("Duplicate timestamp {timestamp} at index {index}")]
    DuplicateTimestamp { index: usize, timestamp: i64 },

    #[error("Timestamp {current} at index {index} is earlier than previous {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },
}

/// Invalid option or parameter selection. Raised before any computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown matcher category: {0}")]
    UnknownCategory(String),

    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors returned by [`Engine::analyze`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> ConfigResult<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(ConfigError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> ConfigResult<Self> {
        if value == 0 {
            return Err(ConfigError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait. Timestamps are Unix epoch milliseconds.
pub trait OHLCV {
    fn timestamp(&self) -> i64;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// (high + low + close) / 3
    #[inline]
    fn typical_price(&self) -> f64 {
        (self.high() + self.low() + self.close()) / 3.0
    }

    /// True range against the previous close; plain range for the first bar.
    #[inline]
    fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => self
                .range()
                .max((self.high() - pc).abs())
                .max((self.low() - pc).abs()),
            None => self.range(),
        }
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.lower_shadow() / range)
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Neutral => "neutral",
            Direction::Bearish => "bearish",
        }
    }
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Market trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Trend {
    StrongUp,
    WeakUp,
    #[default]
    Sideways,
    WeakDown,
    StrongDown,
}

impl Trend {
    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::WeakDown | Trend::StrongDown)
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::WeakUp | Trend::StrongUp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::StrongUp => "strong uptrend",
            Trend::WeakUp => "weak uptrend",
            Trend::Sideways => "sideways",
            Trend::WeakDown => "weak downtrend",
            Trend::StrongDown => "strong downtrend",
        }
    }
}

/// Per-bar context shared by the candlestick rules and trade-level sizing
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketContext {
    pub trend: Trend,
    /// Average body over the bars before this one
    pub avg_body: f64,
    /// Average range (high - low) over the bars before this one
    pub avg_range: f64,
    /// Average true range ending at this bar (inclusive)
    pub atr: f64,
    /// Average volume over the bars before this one; None until the window is full
    pub avg_volume: Option<f64>,
}

impl MarketContext {
    /// Precompute contexts for every bar of the series.
    pub fn compute_all(series: &Series, params: &ContextParams) -> Vec<MarketContext> {
        let bars = series.bars();
        let candle_period = params.candle_period.get();
        let atr_period = params.atr_period.get();
        let volume_period = params.volume_period.get();

        let true_ranges: Vec<f64> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| bar.true_range(i.checked_sub(1).map(|p| bars[p].close)))
            .collect();

        (0..bars.len())
            .map(|i| {
                let (avg_body, avg_range) = if i == 0 {
                    (bars[0].body(), bars[0].range())
                } else {
                    let trail = &bars[i.saturating_sub(candle_period)..i];
                    let count = trail.len() as f64;
                    let (body, range) = trail
                        .iter()
                        .fold((0.0, 0.0), |(b, r), bar| (b + bar.body(), r + bar.range()));
                    (body / count, range / count)
                };

                let atr_slice = &true_ranges[(i + 1).saturating_sub(atr_period)..=i];
                let atr = atr_slice.iter().sum::<f64>() / atr_slice.len() as f64;

                MarketContext {
                    trend: compute_trend(series, i, params.trend_period.get()),
                    avg_body,
                    avg_range,
                    atr,
                    avg_volume: detectors::helpers::trailing_avg_volume(
                        bars,
                        i,
                        volume_period,
                    ),
                }
            })
            .collect()
    }
}

fn compute_trend(series: &Series, index: usize, period: usize) -> Trend {
    if index < period {
        return Trend::Sideways;
    }

    let bars = series.bars();
    let first_close = bars[index - period].close;
    let last_close = bars[index].close;

    if first_close <= f64::EPSILON {
        return Trend::Sideways;
    }

    let change = (last_close - first_close) / first_close;

    match change {
        c if c > 0.05 => Trend::StrongUp,
        c if c > 0.02 => Trend::WeakUp,
        c if c < -0.05 => Trend::StrongDown,
        c if c < -0.02 => Trend::WeakDown,
        _ => Trend::Sideways,
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Output of one analysis call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub indicators: IndicatorSet,
    pub levels: Vec<Level>,
    /// Top-K patterns in ranker order
    pub patterns: Vec<DetectedPattern>,
    /// Overlays in the same order as `patterns`
    pub overlays: Vec<Overlay>,
}

/// Main analysis engine. Immutable after [`EngineBuilder::build`].
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    knowledge: KnowledgeBase,
    candlesticks: CandlestickMatcher,
    /// Validated exchange offset from `config.sessions`
    session_offset: FixedOffset,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Validate the bars and run the full pipeline.
    pub fn analyze<T: OHLCV>(&self, bars: &[T], options: &AnalysisOptions) -> Result<Analysis> {
        options.validate()?;
        let series = Series::from_bars(bars)?;
        Ok(self.analyze_series(&series, options))
    }

    /// Run the pipeline over an already normalized series.
    ///
    /// Infallible: insufficient history only yields undefined indicator values
    /// and fewer patterns.
    pub fn analyze_series(&self, series: &Series, options: &AnalysisOptions) -> Analysis {
        let span = tracing::debug_span!("analyze", bars = series.len());
        let _guard = span.enter();

        let selection = options.required_indicators(&self.config);
        let indicators =
            IndicatorSet::compute(series, &selection, &self.config.indicators, self.session_offset);
        tracing::debug!(selected = selection.len(), "indicators computed");

        let levels = levels::detect(series, &self.config.levels);
        tracing::debug!(count = levels.len(), "levels detected");

        let contexts = MarketContext::compute_all(series, &self.config.context);
        let input = MatchInput {
            series,
            indicators: &indicators,
            levels: &levels,
            contexts: &contexts,
            knowledge: &self.knowledge,
        };

        let mut matches = Vec::new();

        let wants_candles = options.is_enabled(MatcherCategory::Candlestick);
        let wants_confluence = options.is_enabled(MatcherCategory::Confluence);
        if wants_candles || wants_confluence {
            let candles = self.candlesticks.scan(&input);
            tracing::debug!(count = candles.len(), "candlestick matches");
            if wants_confluence {
                let promoted = confluence::promote(&input, &candles, &self.config.confluence);
                tracing::debug!(count = promoted.len(), "confluence matches");
                matches.extend(promoted);
            }
            if wants_candles {
                matches.extend(candles);
            }
        }

        if options.is_enabled(MatcherCategory::Combination) {
            let found = combination::scan(&input, &self.config.combination);
            tracing::debug!(count = found.len(), "combination matches");
            matches.extend(found);
        }

        if options.is_enabled(MatcherCategory::CompositeSwing) {
            let found = composite::swing(&input, &self.config.swing);
            tracing::debug!(count = found.len(), "swing signals");
            matches.extend(found);
        }

        if options.is_enabled(MatcherCategory::CompositeIntraday) {
            let found = composite::intraday(&input, &self.config.intraday, self.session_offset);
            tracing::debug!(count = found.len(), "intraday signals");
            matches.extend(found);
        }

        let patterns = ranker::rank(matches, &self.config.ranking);
        let overlays = overlay::generate(&patterns, series, &self.config.overlay);
        tracing::debug!(
            patterns = patterns.len(),
            overlays = overlays.len(),
            "analysis complete"
        );

        Analysis {
            indicators,
            levels,
            patterns,
            overlays,
        }
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating [`Engine`] instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    knowledge: KnowledgeBase,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject the pattern probability/confidence table
    pub fn knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Number of patterns kept by the ranker
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.ranking.top_k = top_k;
        self
    }

    /// VWAP reset policy
    pub fn vwap_anchor(mut self, anchor: config::VwapAnchor) -> Self {
        self.config.indicators.vwap_anchor = anchor;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        self.knowledge.validate()?;
        let session_offset = self.config.sessions.offset()?;
        let candlesticks = CandlestickMatcher::with_defaults();
        candlesticks.validate_config()?;
        Ok(Engine {
            config: self.config,
            knowledge: self.knowledge,
            candlesticks,
            session_offset,
        })
    }
}

/// Analyze with the default engine configuration.
pub fn analyze<T: OHLCV>(bars: &[T], options: &AnalysisOptions) -> Result<Analysis> {
    EngineBuilder::new().build()?.analyze(bars, options)
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub analysis: Analysis,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Parallel analysis of multiple instruments, one series per task
pub fn analyze_parallel<'a, T, I>(
    engine: &Engine,
    instruments: I,
    options: &AnalysisOptions,
) -> (Vec<SymbolAnalysis>, Vec<SymbolFailure>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .analyze(bars, options)
                .map(|analysis| SymbolAnalysis {
                    symbol: symbol.to_string(),
                    analysis,
                })
                .map_err(|error| SymbolFailure {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
