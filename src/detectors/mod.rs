//! Pattern matchers
//!
//! All matchers read the same [`MatchInput`] snapshot and return independent
//! matches; overlap and duplicates are resolved later by the ranker.
//!
//! # Matcher Families
//!
//! - **Candlestick**: 1-3 bar shape rules (Doji, Hammer, Engulfing, Stars, ...)
//! - **Confluence**: candlestick matches confirmed by a nearby level
//! - **Combination**: divergences, crosses, volume breakouts, multi-bar structures
//! - **Composite**: swing pullback and intraday gap breakout strategies

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple rule types.
macro_rules! impl_with_defaults {
  ($($rule:ty),* $(,)?) => {
    $(impl $rule {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod candlestick;
pub mod combination;
pub mod composite;
pub mod confluence;

use crate::indicators::IndicatorSet;
use crate::knowledge::{KnowledgeBase, PatternCode, PatternStats};
use crate::levels::Level;
use crate::pattern::{DetectedPattern, PatternDetail, TradeLevels};
use crate::series::{Bar, Series};
use crate::{Direction, MarketContext};

/// Everything a matcher may read for one analysis call
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    pub series: &'a Series,
    pub indicators: &'a IndicatorSet,
    pub levels: &'a [Level],
    /// One context per bar
    pub contexts: &'a [MarketContext],
    pub knowledge: &'a KnowledgeBase,
}

impl<'a> MatchInput<'a> {
    #[inline]
    pub fn bars(&self) -> &'a [Bar] {
        self.series.bars()
    }

    #[inline]
    pub fn context(&self, index: usize) -> MarketContext {
        self.contexts.get(index).copied().unwrap_or_default()
    }

    /// Knowledge entry for `code`; a missing entry disables the pattern.
    pub fn stats(&self, code: PatternCode) -> Option<&'a PatternStats> {
        let stats = self.knowledge.get(code);
        if stats.is_none() {
            tracing::trace!(code = code.as_str(), "no knowledge entry, pattern skipped");
        }
        stats
    }

    /// Build a pattern with explicit trade levels.
    pub fn emit(
        &self,
        detail: PatternDetail,
        code: PatternCode,
        signal: Direction,
        span: (usize, usize),
        levels: Option<TradeLevels>,
    ) -> Option<DetectedPattern> {
        let stats = self.stats(code)?;
        let Some(levels) = levels else {
            tracing::trace!(
                code = code.as_str(),
                end = span.1,
                "degenerate trade levels, pattern skipped"
            );
            return None;
        };
        Some(DetectedPattern::new(detail, code, stats, signal, span, levels))
    }

    /// Build a pattern entered at the close of its last bar and bracketed by
    /// the knowledge table's ATR multiples.
    pub fn emit_atr(
        &self,
        detail: PatternDetail,
        code: PatternCode,
        signal: Direction,
        span: (usize, usize),
    ) -> Option<DetectedPattern> {
        let stats = self.stats(code)?;
        let entry = self.bars().get(span.1)?.close;
        let levels = TradeLevels::from_multiples(
            entry,
            self.context(span.1).atr,
            stats.target_multiple,
            stats.stop_multiple,
            signal,
        );
        self.emit(detail, code, signal, span, levels)
    }
}
