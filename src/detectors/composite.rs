//! Composite strategy signals
//!
//! Each signal is a strict AND of sub-conditions over indicators and levels.
//! There is no partial credit: a bar missing any precondition (including an
//! undefined indicator value) produces nothing.

use chrono::FixedOffset;

use super::helpers::{strictly_rising, trailing_avg_volume, value_at};
use super::MatchInput;
use crate::config::{IntradayParams, SwingParams};
use crate::knowledge::codes;
use crate::levels::LevelKind;
use crate::pattern::{DetectedPattern, PatternDetail, Strategy, TradeLevels};
use crate::Direction;

/// Swing pullback in an established uptrend.
///
/// All of, at bar `i`:
/// - trend: SMA(fast) > SMA(slow) and close > SMA(slow)
/// - location: close within tolerance of SMA(fast) or of a Support level
/// - momentum: RSI below `rsi_max` and strictly rising over `rising_bars`
///   bars, and the MACD histogram turning from <= 0 to > 0
pub fn swing(input: &MatchInput<'_>, params: &SwingParams) -> Vec<DetectedPattern> {
    let fast_period = params.trend_fast.get();
    let slow_period = params.trend_slow.get();
    let (Some(fast), Some(slow), Some(rsi), Some(macd)) = (
        input.indicators.sma(fast_period),
        input.indicators.sma(slow_period),
        input.indicators.rsi(),
        input.indicators.macd(),
    ) else {
        return Vec::new();
    };

    let bars = input.bars();
    let rising = params.rising_bars.get();
    let tolerance = params.location_tolerance.get();
    let mut out = Vec::new();

    for i in rising.max(1)..bars.len() {
        let close = bars[i].close;

        let (Some(sma_fast), Some(sma_slow)) = (value_at(Some(fast), i), value_at(Some(slow), i))
        else {
            continue;
        };
        if sma_fast <= sma_slow || close <= sma_slow {
            continue;
        }

        let near_average = sma_fast.abs() > f64::EPSILON
            && ((close - sma_fast) / sma_fast).abs() <= tolerance;
        let support = input
            .levels
            .iter()
            .filter(|l| l.kind == LevelKind::Support && l.first_index <= i)
            .find(|l| l.is_near(close, tolerance));
        if !near_average && support.is_none() {
            continue;
        }

        let Some(rsi_now) = value_at(Some(rsi), i) else {
            continue;
        };
        if rsi_now >= params.rsi_max || !strictly_rising(rsi, i, rising) {
            continue;
        }

        let (Some(hist_prev), Some(hist_now)) = (
            value_at(Some(&macd.histogram), i - 1),
            value_at(Some(&macd.histogram), i),
        ) else {
            continue;
        };
        if !(hist_prev <= 0.0 && hist_now > 0.0) {
            continue;
        }

        let detail = PatternDetail::Composite {
            strategy: Strategy::Swing,
        };
        let Some(p) = input.emit_atr(detail, codes::SWING_PULLBACK, Direction::Bullish, (i - rising, i))
        else {
            continue;
        };

        let location = match support {
            Some(level) => format!(
                "Close {close:.2} at Support {:.2} ({} touches)",
                level.price, level.strength
            ),
            None => format!("Close {close:.2} within {:.1}% of SMA{fast_period}", tolerance * 100.0),
        };
        let evidence = vec![
            format!("SMA{fast_period} {sma_fast:.2} above SMA{slow_period} {sma_slow:.2}"),
            location,
            format!("RSI {rsi_now:.1} rising for {rising} bars"),
            format!("MACD histogram turned positive ({hist_prev:.4} -> {hist_now:.4})"),
        ];
        let confirmation = vec![
            format!("Close stays above SMA{slow_period}"),
            "RSI continues higher".to_string(),
            format!("Stop {:.2} is not breached", p.stop_loss),
        ];
        out.push(p.with_evidence(evidence).with_confirmation(confirmation));
    }

    out
}

/// Gap-up breakout on the first bar of a session.
///
/// All of, at a session-opening bar `i` (not the first bar of the series):
/// - open gaps at least `min_gap` above the previous close
/// - volume >= `volume_multiple` × the trailing average
/// - RSI within `rsi_min..=rsi_max`
/// - close above SMA(`trend_period`)
///
/// The stop is the previous close (gap fill) when it sits below the entry,
/// otherwise an ATR stop.
pub fn intraday(
    input: &MatchInput<'_>,
    params: &IntradayParams,
    offset: FixedOffset,
) -> Vec<DetectedPattern> {
    let trend_period = params.trend_period.get();
    let (Some(rsi), Some(trend)) = (input.indicators.rsi(), input.indicators.sma(trend_period))
    else {
        return Vec::new();
    };

    let bars = input.bars();
    let starts = input.series.session_starts(offset);
    let mut out = Vec::new();

    for i in 1..bars.len() {
        if !starts[i] {
            continue;
        }
        let (prev_close, bar) = (bars[i - 1].close, &bars[i]);
        if prev_close <= 0.0 {
            continue;
        }

        let gap = (bar.open - prev_close) / prev_close;
        if gap < params.min_gap.get() {
            continue;
        }

        let Some(avg_volume) = trailing_avg_volume(bars, i, params.volume_window.get()) else {
            continue;
        };
        let volume_ratio = bar.volume / avg_volume;
        if volume_ratio < params.volume_multiple {
            continue;
        }

        let Some(rsi_now) = value_at(Some(rsi), i) else {
            continue;
        };
        if rsi_now < params.rsi_min || rsi_now > params.rsi_max {
            continue;
        }

        let Some(sma) = value_at(Some(trend), i) else {
            continue;
        };
        if bar.close <= sma {
            continue;
        }

        let Some(stats) = input.stats(codes::GAP_BREAKOUT) else {
            return out;
        };
        let atr = input.context(i).atr;
        let entry = bar.close;
        let stop = if prev_close < entry {
            prev_close
        } else {
            entry - stats.stop_multiple * atr
        };
        let levels = TradeLevels::new(entry, entry + stats.target_multiple * atr, stop);

        let detail = PatternDetail::Composite {
            strategy: Strategy::IntradayBreakout,
        };
        let Some(p) = input.emit(detail, codes::GAP_BREAKOUT, Direction::Bullish, (i, i), levels)
        else {
            continue;
        };

        let evidence = vec![
            format!("Session opened {:.2}% above prior close {prev_close:.2}", gap * 100.0),
            format!("Volume {volume_ratio:.1}x the {}-bar average", params.volume_window.get()),
            format!("RSI {rsi_now:.1}"),
            format!("Close {:.2} above SMA{trend_period} {sma:.2}", bar.close),
        ];
        let confirmation = vec![
            format!("Gap does not fill below {prev_close:.2}"),
            "First pullback holds the opening range".to_string(),
        ];
        out.push(p.with_evidence(evidence).with_confirmation(confirmation));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::indicators::{Indicator, IndicatorSelection, IndicatorSet, Line, MacdLines};
    use crate::knowledge::KnowledgeBase;
    use crate::levels::Level;
    use crate::series::{Bar, Series};
    use crate::{MarketContext, Period};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn input_parts(bars: &[Bar]) -> (Series, Vec<MarketContext>) {
        let series = Series::from_bars(bars).unwrap();
        let contexts = MarketContext::compute_all(&series, &EngineConfig::default().context);
        (series, contexts)
    }

    /// Hand-built indicator set so each condition can be toggled
    fn swing_indicators(n: usize, hist_turn: bool) -> IndicatorSet {
        let flat = |v: f64| -> Line { vec![Some(v); n] };
        let mut set = IndicatorSet::default();
        set.sma.insert(50, flat(100.0));
        set.sma.insert(200, flat(90.0));

        let mut rsi = flat(50.0);
        for (k, v) in [30.0, 32.0, 34.0, 36.0].into_iter().enumerate() {
            rsi[n - 4 + k] = Some(v);
        }
        set.rsi = Some(rsi);

        let mut histogram = flat(-0.1);
        if hist_turn {
            histogram[n - 1] = Some(0.2);
        }
        set.macd = Some(MacdLines {
            line: flat(0.0),
            signal: flat(0.0),
            histogram,
        });
        set
    }

    fn pullback_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::new(i as i64 * 86_400_000, 100.5, 101.5, 99.5, 100.8, 1_000.0))
            .collect()
    }

    #[test]
    fn test_swing_fires_when_all_conditions_hold() {
        let bars = pullback_bars(30);
        let (series, contexts) = input_parts(&bars);
        let indicators = swing_indicators(30, true);
        let kb = KnowledgeBase::builtin();
        let input = MatchInput {
            series: &series,
            indicators: &indicators,
            levels: &[],
            contexts: &contexts,
            knowledge: &kb,
        };

        let found = swing(&input, &SwingParams::default());
        assert_eq!(found.len(), 1);
        let p = &found[0];
        assert_eq!(p.code, codes::SWING_PULLBACK);
        assert_eq!((p.start_index, p.end_index), (26, 29));
        assert_eq!(p.evidence.len(), 4);
    }

    #[test]
    fn test_swing_requires_macd_turn() {
        let bars = pullback_bars(30);
        let (series, contexts) = input_parts(&bars);
        let indicators = swing_indicators(30, false);
        let kb = KnowledgeBase::builtin();
        let input = MatchInput {
            series: &series,
            indicators: &indicators,
            levels: &[],
            contexts: &contexts,
            knowledge: &kb,
        };
        assert!(swing(&input, &SwingParams::default()).is_empty());
    }

    #[test]
    fn test_swing_location_from_support() {
        // close far from SMA50 but sitting on a support
        let bars: Vec<Bar> = (0..30)
            .map(|i| Bar::new(i as i64 * 86_400_000, 95.5, 96.0, 94.8, 95.2, 1_000.0))
            .collect();
        let (series, contexts) = input_parts(&bars);
        let indicators = swing_indicators(30, true);
        let kb = KnowledgeBase::builtin();
        let support = [Level {
            price: 95.0,
            kind: LevelKind::Support,
            strength: 3,
            first_index: 5,
            last_index: 20,
        }];

        let without = MatchInput {
            series: &series,
            indicators: &indicators,
            levels: &[],
            contexts: &contexts,
            knowledge: &kb,
        };
        assert!(swing(&without, &SwingParams::default()).is_empty());

        let with = MatchInput {
            levels: &support,
            ..without
        };
        assert_eq!(swing(&with, &SwingParams::default()).len(), 1);
    }

    fn gap_bars() -> Vec<Bar> {
        let day = 86_400_000i64;
        let hour = 3_600_000i64;
        let mut bars = Vec::new();
        // 30 quiet hourly bars over a few days, drifting up
        for i in 0..30i64 {
            let ts = (i / 6) * day + (i % 6) * hour;
            let c = 100.0 + i as f64 * 0.1 + if i % 2 == 0 { 0.3 } else { -0.2 };
            bars.push(Bar::new(ts, c - 0.1, c + 0.4, c - 0.4, c, 1_000.0));
        }
        // next day opens with a gap on heavy volume
        let prev = bars[29].close;
        let open = prev * 1.01;
        bars.push(Bar::new(5 * day, open, open + 1.0, open - 0.2, open + 0.8, 2_500.0));
        bars
    }

    #[test]
    fn test_intraday_gap_breakout() {
        let bars = gap_bars();
        let (series, contexts) = input_parts(&bars);
        let selection: IndicatorSelection = [Indicator::Rsi, Indicator::Sma(20)].into_iter().collect();
        let config = EngineConfig::default();
        let indicators =
            IndicatorSet::compute(&series, &selection, &config.indicators, utc());
        let kb = KnowledgeBase::builtin();
        let input = MatchInput {
            series: &series,
            indicators: &indicators,
            levels: &[],
            contexts: &contexts,
            knowledge: &kb,
        };

        let rsi_last = value_at(indicators.rsi(), 30).unwrap();
        assert!((40.0..=80.0).contains(&rsi_last), "rsi {rsi_last}");

        let found = intraday(&input, &IntradayParams::default(), utc());
        assert_eq!(found.len(), 1);
        let p = &found[0];
        assert_eq!((p.start_index, p.end_index), (30, 30));
        assert_eq!(p.stop_loss, bars[29].close);
        assert!(p.risk_reward > 0.0);

        // a higher gap threshold suppresses it
        let strict = IntradayParams {
            min_gap: crate::Ratio::new_const(0.05),
            ..IntradayParams::default()
        };
        assert!(intraday(&input, &strict, utc()).is_empty());

        // without volume history nothing fires
        let long_window = IntradayParams {
            volume_window: Period::new_const(50),
            ..IntradayParams::default()
        };
        assert!(intraday(&input, &long_window, utc()).is_empty());
    }

    #[test]
    fn test_intraday_sessions_follow_offset() {
        let bars = gap_bars();
        let (series, contexts) = input_parts(&bars);
        let selection: IndicatorSelection = [Indicator::Rsi, Indicator::Sma(20)].into_iter().collect();
        let config = EngineConfig::default();
        let indicators =
            IndicatorSet::compute(&series, &selection, &config.indicators, utc());
        let kb = KnowledgeBase::builtin();
        let input = MatchInput {
            series: &series,
            indicators: &indicators,
            levels: &[],
            contexts: &contexts,
            knowledge: &kb,
        };

        // at UTC-1 the gap bar (00:00 UTC) is 23:00 of the previous local day,
        // so it no longer opens a session
        let west = FixedOffset::west_opt(3_600).unwrap();
        assert!(!series.session_starts(west)[30]);
        assert!(intraday(&input, &IntradayParams::default(), west).is_empty());
        assert_eq!(intraday(&input, &IntradayParams::default(), utc()).len(), 1);
    }
}
