//! Advanced combination patterns
//!
//! Cross-indicator signals and multi-bar structures:
//!
//! - **Divergence**: RSI, MACD, stochastic %K or the close-to-VWAP distance
//!   disagreeing with consecutive swing highs/lows
//! - **Cross**: MACD signal cross, stochastic cross out of an extreme zone,
//!   VWAP reclaim/rejection, Golden/Death cross of the trend SMAs
//! - **Breakout**: close through a level or an inside bar's mother range on volume
//! - **Structure**: triple top/bottom, ascending triangle, cup and handle
//!
//! Probability and confidence come from the knowledge table, never from the data.

use super::helpers::{
    crossed_above, crossed_below, highest_high, lowest_low, relative_spread, value_at,
    volume_surge,
};
use super::MatchInput;
use crate::config::CombinationParams;
use crate::indicators::Line;
use crate::knowledge::{codes, PatternCode};
use crate::levels::{find_extrema, Extremum};
use crate::pattern::{CombinationFamily, DetectedPattern, PatternDetail, TradeLevels};
use crate::Direction;

const DIVERGENCE: PatternDetail = PatternDetail::Combination {
    family: CombinationFamily::Divergence,
};
const CROSS: PatternDetail = PatternDetail::Combination {
    family: CombinationFamily::Cross,
};
const BREAKOUT: PatternDetail = PatternDetail::Combination {
    family: CombinationFamily::Breakout,
};
const STRUCTURE: PatternDetail = PatternDetail::Combination {
    family: CombinationFamily::Structure,
};

/// Run every combination detector. Output order is detector order, then bar order.
pub fn scan(input: &MatchInput<'_>, params: &CombinationParams) -> Vec<DetectedPattern> {
    let mut out = Vec::new();
    out.extend(divergences(input, params));
    out.extend(macd_crosses(input));
    out.extend(stochastic_crosses(input, params));
    out.extend(vwap_crosses(input));
    out.extend(trend_crosses(input, params));
    out.extend(level_breakouts(input, params));
    out.extend(inside_bar_breakouts(input, params));
    out.extend(triple_tops_bottoms(input, params));
    out.extend(ascending_triangles(input, params));
    out.extend(cup_and_handles(input, params));
    out
}

fn with_text(
    pattern: DetectedPattern,
    evidence: Vec<String>,
    confirmation: Vec<String>,
) -> DetectedPattern {
    pattern.with_evidence(evidence).with_confirmation(confirmation)
}

// ============================================================
// DIVERGENCES
// ============================================================

/// Oscillator divergences against consecutive pivots.
///
/// Oscillators: RSI, the MACD line, stochastic %K and the distance of the
/// close from VWAP. Bullish: lower low in price, higher low in the oscillator.
/// Bearish: higher high in price, lower high in the oscillator. Spans outside
/// `min_divergence_span..=max_divergence_span` bars are ignored.
pub fn divergences(input: &MatchInput<'_>, params: &CombinationParams) -> Vec<DetectedPattern> {
    let bars = input.bars();
    let extrema = find_extrema(bars, params.pivot_radius.get());
    let vwap_distance: Option<Line> = input.indicators.vwap().map(|vwap| {
        bars.iter()
            .zip(vwap)
            .map(|(bar, &v)| v.map(|v| bar.close - v))
            .collect()
    });
    let mut out = Vec::new();

    let oscillators: [(&str, Option<&Line>, PatternCode, PatternCode); 4] = [
        (
            "RSI",
            input.indicators.rsi(),
            codes::RSI_BULLISH_DIVERGENCE,
            codes::RSI_BEARISH_DIVERGENCE,
        ),
        (
            "MACD",
            input.indicators.macd().map(|m| &m.line),
            codes::MACD_BULLISH_DIVERGENCE,
            codes::MACD_BEARISH_DIVERGENCE,
        ),
        (
            "Stochastic %K",
            input.indicators.stochastic().map(|s| &s.k),
            codes::STOCH_BULLISH_DIVERGENCE,
            codes::STOCH_BEARISH_DIVERGENCE,
        ),
        (
            "Close-VWAP distance",
            vwap_distance.as_ref(),
            codes::VWAP_BULLISH_DIVERGENCE,
            codes::VWAP_BEARISH_DIVERGENCE,
        ),
    ];

    for (name, line, bullish, bearish) in oscillators {
        let Some(line) = line else { continue };
        out.extend(diverging_pairs(&extrema.valleys, line, params, true).filter_map(
            |(a, b, oa, ob)| {
                let p = input.emit_atr(DIVERGENCE, bullish, Direction::Bullish, (a.index, b.index))?;
                Some(with_text(
                    p,
                    vec![
                        format!("Price lower low {:.2} -> {:.2}", a.price, b.price),
                        format!("{name} higher low {oa:.2} -> {ob:.2}"),
                    ],
                    vec![format!("Price holds above {:.2}", b.price)],
                ))
            },
        ));
        out.extend(diverging_pairs(&extrema.peaks, line, params, false).filter_map(
            |(a, b, oa, ob)| {
                let p = input.emit_atr(DIVERGENCE, bearish, Direction::Bearish, (a.index, b.index))?;
                Some(with_text(
                    p,
                    vec![
                        format!("Price higher high {:.2} -> {:.2}", a.price, b.price),
                        format!("{name} lower high {oa:.2} -> {ob:.2}"),
                    ],
                    vec![format!("Price fails to exceed {:.2}", b.price)],
                ))
            },
        ));
    }

    out
}

fn diverging_pairs<'a>(
    pivots: &'a [Extremum],
    line: &'a [Option<f64>],
    params: &'a CombinationParams,
    bullish: bool,
) -> impl Iterator<Item = (Extremum, Extremum, f64, f64)> + 'a {
    let min_span = params.min_divergence_span.get();
    let max_span = params.max_divergence_span.get();
    pivots.windows(2).filter_map(move |w| {
        let (a, b) = (w[0], w[1]);
        let span = b.index - a.index;
        if span < min_span || span > max_span {
            return None;
        }
        let oa = line.get(a.index).copied().flatten()?;
        let ob = line.get(b.index).copied().flatten()?;
        let diverges = if bullish {
            b.price < a.price && ob > oa
        } else {
            b.price > a.price && ob < oa
        };
        diverges.then_some((a, b, oa, ob))
    })
}

// ============================================================
// CROSSES
// ============================================================

/// MACD line crossing its signal line
pub fn macd_crosses(input: &MatchInput<'_>) -> Vec<DetectedPattern> {
    let Some(macd) = input.indicators.macd() else {
        return Vec::new();
    };
    let mut out = Vec::new();

    for i in 1..input.bars().len() {
        let (code, signal, side) = if crossed_above(&macd.line, &macd.signal, i) {
            (codes::MACD_BULLISH_CROSS, Direction::Bullish, "above")
        } else if crossed_below(&macd.line, &macd.signal, i) {
            (codes::MACD_BEARISH_CROSS, Direction::Bearish, "below")
        } else {
            continue;
        };
        let Some(p) = input.emit_atr(CROSS, code, signal, (i - 1, i)) else {
            continue;
        };
        let hist = value_at(Some(&macd.histogram), i).unwrap_or_default();
        out.push(with_text(
            p,
            vec![
                format!("MACD crossed {side} its signal line at bar {i}"),
                format!("Histogram {hist:.4}"),
            ],
            vec!["Histogram keeps expanding on the next bar".into()],
        ));
    }

    out
}

/// %K crossing %D from inside the oversold/overbought zone
pub fn stochastic_crosses(input: &MatchInput<'_>, params: &CombinationParams) -> Vec<DetectedPattern> {
    let Some(stoch) = input.indicators.stochastic() else {
        return Vec::new();
    };
    let mut out = Vec::new();

    for i in 1..input.bars().len() {
        let Some(prev_k) = value_at(Some(&stoch.k), i - 1) else {
            continue;
        };
        let (code, signal, zone) =
            if crossed_above(&stoch.k, &stoch.d, i) && prev_k < params.stochastic_oversold {
                (codes::STOCH_OVERSOLD_CROSS, Direction::Bullish, "oversold")
            } else if crossed_below(&stoch.k, &stoch.d, i) && prev_k > params.stochastic_overbought {
                (codes::STOCH_OVERBOUGHT_CROSS, Direction::Bearish, "overbought")
            } else {
                continue;
            };
        if let Some(p) = input.emit_atr(CROSS, code, signal, (i - 1, i)) {
            out.push(with_text(
                p,
                vec![format!("%K crossed %D from the {zone} zone ({prev_k:.1})")],
                vec!["%K leaves the extreme zone".into()],
            ));
        }
    }

    out
}

/// Close crossing VWAP
pub fn vwap_crosses(input: &MatchInput<'_>) -> Vec<DetectedPattern> {
    let Some(vwap) = input.indicators.vwap() else {
        return Vec::new();
    };
    let closes: Line = input.bars().iter().map(|b| Some(b.close)).collect();
    let mut out = Vec::new();

    for i in 1..closes.len() {
        let (code, signal, text) = if crossed_above(&closes, vwap, i) {
            (codes::VWAP_RECLAIM, Direction::Bullish, "reclaimed")
        } else if crossed_below(&closes, vwap, i) {
            (codes::VWAP_REJECTION, Direction::Bearish, "lost")
        } else {
            continue;
        };
        if let Some(p) = input.emit_atr(CROSS, code, signal, (i - 1, i)) {
            let level = value_at(Some(vwap), i).unwrap_or_default();
            out.push(with_text(
                p,
                vec![format!("Close {text} VWAP {level:.2}")],
                vec!["Next close stays on the same side of VWAP".into()],
            ));
        }
    }

    out
}

/// Golden/Death cross: sign change of SMA(fast) - SMA(slow) between consecutive bars
pub fn trend_crosses(input: &MatchInput<'_>, params: &CombinationParams) -> Vec<DetectedPattern> {
    let fast_period = params.trend_fast.get();
    let slow_period = params.trend_slow.get();
    let (Some(fast), Some(slow)) = (
        input.indicators.sma(fast_period),
        input.indicators.sma(slow_period),
    ) else {
        return Vec::new();
    };
    let mut out = Vec::new();

    for i in 1..input.bars().len() {
        let (code, signal) = if crossed_above(fast, slow, i) {
            (codes::GOLDEN_CROSS, Direction::Bullish)
        } else if crossed_below(fast, slow, i) {
            (codes::DEATH_CROSS, Direction::Bearish)
        } else {
            continue;
        };
        if let Some(p) = input.emit_atr(CROSS, code, signal, (i - 1, i)) {
            let spread = value_at(Some(fast), i).unwrap_or_default()
                - value_at(Some(slow), i).unwrap_or_default();
            out.push(with_text(
                p,
                vec![
                    format!("SMA{fast_period} crossed SMA{slow_period} at bar {i}"),
                    format!("Spread {spread:.4}"),
                ],
                vec![format!("Price stays on the {} side of SMA{slow_period}", signal.as_str())],
            ));
        }
    }

    out
}

// ============================================================
// BREAKOUTS
// ============================================================

/// Close through a level on a volume surge. One pattern per bar, using the
/// strongest level crossed.
pub fn level_breakouts(input: &MatchInput<'_>, params: &CombinationParams) -> Vec<DetectedPattern> {
    let bars = input.bars();
    let mut out = Vec::new();

    for i in 1..bars.len() {
        let Some(ratio) =
            volume_surge(bars, i, params.volume_window.get(), params.volume_multiple)
        else {
            continue;
        };
        let (prev, close) = (bars[i - 1].close, bars[i].close);

        // levels are sorted strongest first
        let crossed = input.levels.iter().find_map(|level| {
            if level.first_index >= i {
                return None;
            }
            if prev <= level.price && close > level.price {
                Some((level, Direction::Bullish))
            } else if prev >= level.price && close < level.price {
                Some((level, Direction::Bearish))
            } else {
                None
            }
        });
        let Some((level, signal)) = crossed else {
            continue;
        };

        let code = if signal.is_bullish() {
            codes::BREAKOUT_VOLUME
        } else {
            codes::BREAKDOWN_VOLUME
        };
        let Some(stats) = input.stats(code) else {
            continue;
        };
        let atr = input.context(i).atr;
        let levels = if signal.is_bullish() {
            TradeLevels::new(
                close,
                close + stats.target_multiple * atr,
                level.price.min(close - stats.stop_multiple * atr),
            )
        } else {
            TradeLevels::new(
                close,
                close - stats.target_multiple * atr,
                level.price.max(close + stats.stop_multiple * atr),
            )
        };

        if let Some(p) = input.emit(BREAKOUT, code, signal, (i - 1, i), levels) {
            out.push(with_text(
                p,
                vec![
                    format!(
                        "Close {:.2} through {} {:.2} ({} touches)",
                        close,
                        level.kind.as_str(),
                        level.price,
                        level.strength
                    ),
                    format!("Volume {ratio:.1}x the {}-bar average", params.volume_window.get()),
                ],
                vec![format!("Retest of {:.2} holds", level.price)],
            ));
        }
    }

    out
}

/// Inside bar followed by a close beyond the mother bar on a volume surge.
///
/// Stop sits at the opposite side of the mother bar; target is the knowledge
/// target multiple of that risk.
pub fn inside_bar_breakouts(
    input: &MatchInput<'_>,
    params: &CombinationParams,
) -> Vec<DetectedPattern> {
    let bars = input.bars();
    let Some(stats) = input.stats(codes::INSIDE_BAR_BREAKOUT) else {
        return Vec::new();
    };
    let mut out = Vec::new();

    for i in 2..bars.len() {
        let (mother, inside, bar) = (&bars[i - 2], &bars[i - 1], &bars[i]);
        if inside.high >= mother.high || inside.low <= mother.low {
            continue;
        }
        let Some(ratio) =
            volume_surge(bars, i, params.volume_window.get(), params.volume_multiple)
        else {
            continue;
        };

        let (signal, stop) = if bar.close > mother.high {
            (Direction::Bullish, mother.low)
        } else if bar.close < mother.low {
            (Direction::Bearish, mother.high)
        } else {
            continue;
        };
        let risk = bar.close - stop;
        let levels = TradeLevels::new(bar.close, bar.close + risk * stats.target_multiple, stop);

        if let Some(p) = input.emit(BREAKOUT, codes::INSIDE_BAR_BREAKOUT, signal, (i - 2, i), levels) {
            out.push(with_text(
                p,
                vec![
                    format!("Inside bar at {} within mother bar {:.2}-{:.2}", i - 1, mother.low, mother.high),
                    format!("Breakout close {:.2} on {ratio:.1}x volume", bar.close),
                ],
                vec![format!("Mother bar {} side holds", if signal.is_bullish() { "high" } else { "low" })],
            ));
        }
    }

    out
}

// ============================================================
// STRUCTURES
// ============================================================

/// Three equal highs (lows) confirmed by a close through the neckline.
///
/// Entry at the neckline, target one pattern height beyond it, stop at the
/// extreme of the three touches.
pub fn triple_tops_bottoms(
    input: &MatchInput<'_>,
    params: &CombinationParams,
) -> Vec<DetectedPattern> {
    let bars = input.bars();
    let extrema = find_extrema(bars, params.pivot_radius.get());
    let window = params.structure_window.get();
    let tolerance = params.structure_tolerance.get();
    let min_depth = params.min_structure_depth.get();
    let mut out = Vec::new();

    for top in [true, false] {
        let pivots = if top { &extrema.peaks } else { &extrema.valleys };
        for w in pivots.windows(3) {
            let (first, last) = (w[0].index, w[2].index);
            if last - first > window {
                continue;
            }
            let prices = [w[0].price, w[1].price, w[2].price];
            if relative_spread(&prices) > tolerance {
                continue;
            }
            let mean = prices.iter().sum::<f64>() / 3.0;
            let (neckline, extreme) = if top {
                let Some(neck) = lowest_low(bars, first, last) else { continue };
                (neck, prices.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            } else {
                let Some(neck) = highest_high(bars, first, last) else { continue };
                (neck, prices.iter().copied().fold(f64::INFINITY, f64::min))
            };
            let height = (mean - neckline).abs();
            if height / mean.abs() < min_depth {
                continue;
            }

            // first close through the neckline, abandoned if price runs past the extreme
            let limit = last.saturating_add(window).min(bars.len() - 1);
            let confirm = (last + 1..=limit).find_map(|j| {
                let close = bars[j].close;
                let (broke, invalid) = if top {
                    (close < neckline, close > extreme)
                } else {
                    (close > neckline, close < extreme)
                };
                if invalid {
                    Some(None)
                } else {
                    broke.then_some(Some(j))
                }
            });
            let Some(Some(j)) = confirm else { continue };

            let (code, signal, target) = if top {
                (codes::TRIPLE_TOP, Direction::Bearish, neckline - height)
            } else {
                (codes::TRIPLE_BOTTOM, Direction::Bullish, neckline + height)
            };
            let levels = TradeLevels::new(neckline, target, extreme);
            if let Some(p) = input.emit(STRUCTURE, code, signal, (first, j), levels) {
                let touches = w.iter().map(|e| e.index.to_string()).collect::<Vec<_>>().join(", ");
                out.push(with_text(
                    p,
                    vec![
                        format!("Three touches near {mean:.2} at bars {touches}"),
                        format!("Neckline {neckline:.2} broken at bar {j}"),
                        format!("Pattern height {height:.2}"),
                    ],
                    vec![format!("Neckline retest fails to recover {neckline:.2}")],
                ));
            }
        }
    }

    out
}

/// Flat highs over rising lows, confirmed by a close above the flat top.
///
/// Needs two consecutive peaks within tolerance and the valleys before and
/// between them rising. Entry at the flat top, target one base height above,
/// stop at the higher low.
pub fn ascending_triangles(
    input: &MatchInput<'_>,
    params: &CombinationParams,
) -> Vec<DetectedPattern> {
    let bars = input.bars();
    let extrema = find_extrema(bars, params.pivot_radius.get());
    let window = params.structure_window.get();
    let tolerance = params.structure_tolerance.get();
    let min_depth = params.min_structure_depth.get();
    let mut out = Vec::new();

    for w in extrema.peaks.windows(2) {
        let (p1, p2) = (w[0], w[1]);
        if relative_spread(&[p1.price, p2.price]) > tolerance {
            continue;
        }
        let before = extrema.valleys.iter().rev().find(|v| v.index < p1.index);
        let between = extrema
            .valleys
            .iter()
            .find(|v| v.index > p1.index && v.index < p2.index);
        let (Some(low1), Some(low2)) = (before, between) else {
            continue;
        };
        if low2.price <= low1.price || p2.index - low1.index > window {
            continue;
        }

        let top = (p1.price + p2.price) / 2.0;
        let height = top - low1.price;
        if height / top.abs() < min_depth {
            continue;
        }

        let limit = p2.index.saturating_add(window).min(bars.len() - 1);
        let confirm = (p2.index + 1..=limit).find_map(|j| {
            let close = bars[j].close;
            if close < low2.price {
                Some(None)
            } else {
                (close > top).then_some(Some(j))
            }
        });
        let Some(Some(j)) = confirm else { continue };

        let levels = TradeLevels::new(top, top + height, low2.price);
        if let Some(p) = input.emit(
            STRUCTURE,
            codes::ASCENDING_TRIANGLE,
            Direction::Bullish,
            (low1.index, j),
            levels,
        ) {
            out.push(with_text(
                p,
                vec![
                    format!("Flat resistance {top:.2} tested at bars {} and {}", p1.index, p2.index),
                    format!("Higher lows {:.2} -> {:.2}", low1.price, low2.price),
                    format!("Breakout close at bar {j}"),
                ],
                vec![format!("Former resistance {top:.2} acts as support")],
            ));
        }
    }

    out
}

/// Rounded base between two similar rims, a shallow handle, then a close
/// above the right rim.
///
/// Entry at the right rim, target one cup depth above, stop at the handle low.
pub fn cup_and_handles(input: &MatchInput<'_>, params: &CombinationParams) -> Vec<DetectedPattern> {
    let bars = input.bars();
    let peaks = find_extrema(bars, params.pivot_radius.get()).peaks;
    let min_span = params.cup_min_span.get();
    let max_span = params.cup_max_span.get();
    let handle_min = params.handle_min_bars.get();
    let handle_max = params.handle_max_bars.get();
    let mut out = Vec::new();

    for (r_pos, right) in peaks.iter().enumerate() {
        // latest left rim that forms a valid cup with this right rim
        let cup = peaks[..r_pos].iter().rev().find_map(|left| {
            let span = right.index - left.index;
            if span < min_span || span > max_span {
                return None;
            }
            if relative_spread(&[left.price, right.price]) > params.cup_rim_tolerance.get() {
                return None;
            }
            let rim = left.price.max(right.price);
            let inner_high = highest_high(bars, left.index + 1, right.index - 1)?;
            if inner_high > rim {
                return None;
            }
            let bottom = lowest_low(bars, left.index, right.index)?;
            let depth = rim - bottom;
            let ratio = depth / rim.abs();
            if ratio > params.cup_max_depth.get() || ratio < params.min_structure_depth.get() {
                return None;
            }
            Some((left, depth))
        });
        let Some((left, depth)) = cup else { continue };

        // breakout: first close above the right rim after at least handle_min bars
        let Some(breakout) = (right.index + 1..bars.len())
            .take(handle_max.saturating_add(1))
            .find(|&j| bars[j].close > right.price)
        else {
            continue;
        };
        let handle_bars = breakout - right.index - 1;
        if handle_bars < handle_min {
            continue;
        }
        let Some(handle_low) = lowest_low(bars, right.index + 1, breakout - 1) else {
            continue;
        };
        let handle_depth = right.price - handle_low;
        if handle_depth <= 0.0 || handle_depth > depth / 2.0 {
            continue;
        }

        let levels = TradeLevels::new(right.price, right.price + depth, handle_low);
        if let Some(p) = input.emit(
            STRUCTURE,
            codes::CUP_AND_HANDLE,
            Direction::Bullish,
            (left.index, breakout),
            levels,
        ) {
            out.push(with_text(
                p,
                vec![
                    format!("Cup rims {:.2} / {:.2}, depth {depth:.2}", left.price, right.price),
                    format!("Handle of {handle_bars} bars, low {handle_low:.2}"),
                    format!("Close above rim at bar {breakout}"),
                ],
                vec![format!("Volume expands on the move above {:.2}", right.price)],
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use crate::config::{AnalysisOptions, EngineConfig, LevelParams};
    use crate::indicators::IndicatorSet;
    use crate::knowledge::KnowledgeBase;
    use crate::levels::{self, Level};
    use crate::series::{Bar, Series};
    use crate::MarketContext;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    struct Fixture {
        series: Series,
        indicators: IndicatorSet,
        levels: Vec<Level>,
        contexts: Vec<MarketContext>,
        knowledge: KnowledgeBase,
    }

    impl Fixture {
        fn new(bars: Vec<Bar>) -> Self {
            let config = EngineConfig::default();
            let series = Series::from_bars(&bars).unwrap();
            let selection = AnalysisOptions::default().required_indicators(&config);
            let indicators =
                IndicatorSet::compute(&series, &selection, &config.indicators, utc());
            let levels = levels::detect(&series, &LevelParams::default());
            let contexts = MarketContext::compute_all(&series, &config.context);
            Self {
                series,
                indicators,
                levels,
                contexts,
                knowledge: KnowledgeBase::builtin(),
            }
        }

        fn input(&self) -> MatchInput<'_> {
            MatchInput {
                series: &self.series,
                indicators: &self.indicators,
                levels: &self.levels,
                contexts: &self.contexts,
                knowledge: &self.knowledge,
            }
        }
    }

    /// Bars whose close follows `closes` with a fixed half-point wick
    fn bars_from_closes(closes: &[f64], volume: impl Fn(usize) -> f64) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = if i == 0 { c } else { closes[i - 1] };
                Bar::new(
                    i as i64 * 60_000,
                    open,
                    open.max(c) + 0.5,
                    open.min(c) - 0.5,
                    c,
                    volume(i),
                )
            })
            .collect()
    }

    /// Bars with open == close, so highs and lows follow the closes exactly
    fn flat_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64 * 60_000, c, c + 0.5, c - 0.5, c, 1_000.0))
            .collect()
    }

    #[test]
    fn test_golden_cross_brackets_crossing() {
        // long decline then a sharp rally so SMA50 overtakes SMA200
        let closes: Vec<f64> = (0..400)
            .map(|i| {
                if i < 250 {
                    200.0 - i as f64 * 0.3
                } else {
                    125.0 + (i - 250) as f64 * 1.5
                }
            })
            .collect();
        let fixture = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        let input = fixture.input();

        let fast = input.indicators.sma(50).unwrap();
        let slow = input.indicators.sma(200).unwrap();
        let cross = (200..400)
            .find(|&i| {
                fast[i - 1].unwrap() <= slow[i - 1].unwrap() && fast[i].unwrap() > slow[i].unwrap()
            })
            .unwrap();

        let found = trend_crosses(&input, &CombinationParams::default());
        let golden: Vec<_> = found.iter().filter(|p| p.code == codes::GOLDEN_CROSS).collect();
        assert_eq!(golden.len(), 1);
        assert!(golden[0].start_index <= cross && cross <= golden[0].end_index);
        assert_eq!(golden[0].signal, Direction::Bullish);
    }

    #[test]
    fn test_level_breakout_needs_volume() {
        // three touches of 110 resistance, then a break
        let mut closes = Vec::new();
        for _ in 0..3 {
            closes.extend([104.0, 106.0, 108.0, 110.0, 108.0, 106.0, 104.0]);
        }
        closes.extend([106.0, 108.0, 109.0, 113.0]);
        let n = closes.len();

        let loud = Fixture::new(bars_from_closes(&closes, |i| if i == n - 1 { 5_000.0 } else { 1_000.0 }));
        let found = level_breakouts(&loud.input(), &CombinationParams::default());
        let last = found.last().unwrap();
        assert_eq!(last.code, codes::BREAKOUT_VOLUME);
        assert_eq!(last.end_index, n - 1);
        assert!(last.stop_loss < last.entry_price);

        let quiet = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        assert!(level_breakouts(&quiet.input(), &CombinationParams::default()).is_empty());
    }

    #[test]
    fn test_inside_bar_breakout() {
        let mut bars: Vec<Bar> = (0..21)
            .map(|i| Bar::new(i * 60_000, 100.0, 101.0, 99.0, 100.5, 1_000.0))
            .collect();
        bars.push(Bar::new(21 * 60_000, 100.0, 104.0, 96.0, 103.0, 1_000.0));
        bars.push(Bar::new(22 * 60_000, 101.0, 102.0, 99.0, 101.5, 800.0));
        bars.push(Bar::new(23 * 60_000, 102.0, 106.0, 101.5, 105.0, 3_000.0));

        let fixture = Fixture::new(bars);
        let found = inside_bar_breakouts(&fixture.input(), &CombinationParams::default());
        assert_eq!(found.len(), 1);
        let p = &found[0];
        assert_eq!((p.start_index, p.end_index), (21, 23));
        assert_eq!(p.stop_loss, 96.0);
        assert_eq!(p.entry_price, 105.0);
        assert!((p.risk_reward - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_triple_top() {
        let mut closes = vec![96.0, 97.0, 98.0];
        for _ in 0..3 {
            closes.extend([99.0, 101.0, 103.0, 105.0, 103.0, 101.0, 99.0, 97.0]);
        }
        closes.extend([96.0, 95.0, 94.0, 93.0]);
        let fixture = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        let found = triple_tops_bottoms(&fixture.input(), &CombinationParams::default());
        let top = found.iter().find(|p| p.code == codes::TRIPLE_TOP).unwrap();
        assert_eq!(top.signal, Direction::Bearish);
        assert!(top.target_price < top.entry_price);
        assert!(top.stop_loss > top.entry_price);
        assert!(found.iter().all(|p| p.code != codes::TRIPLE_BOTTOM));
    }

    #[test]
    fn test_cup_and_handle() {
        let mut closes: Vec<f64> = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        // cup down to 95 and back
        closes.extend([108.0, 105.0, 102.0, 99.0, 97.0, 95.0, 96.0, 98.0, 101.0, 104.0, 107.0, 109.5]);
        // handle
        closes.extend([108.5, 107.5, 107.0, 106.5, 107.5]);
        // breakout
        closes.extend([111.0, 112.0]);
        let fixture = Fixture::new(flat_bars(&closes));
        let found = cup_and_handles(&fixture.input(), &CombinationParams::default());
        assert_eq!(found.len(), 1);
        let p = &found[0];
        assert_eq!(p.code, codes::CUP_AND_HANDLE);
        assert_eq!(p.start_index, 5);
        assert_eq!(p.end_index, 23);
        assert_eq!(p.stop_loss, 106.0);
        assert_eq!(p.entry_price, 110.0);
        assert_eq!(p.target_price, 126.0);
    }

    fn spans(found: &[DetectedPattern]) -> Vec<(PatternCode, usize, usize)> {
        found.iter().map(|p| (p.code, p.start_index, p.end_index)).collect()
    }

    /// Fast decline to 100, bounce to 108, slower slide to a lower low, recovery
    fn slowing_decline() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..31).map(|i| 130.0 - i as f64).collect();
        closes.extend((1..9).map(|i| 100.0 + i as f64));
        closes.extend((1..14).map(|i| 108.0 - 0.8 * i as f64));
        closes.extend((1..8).map(|i| 97.6 + i as f64));
        closes
    }

    /// Decline to 100, bounce, retest at 101 whose long lower wick makes the lower low
    fn wicked_retest() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..21).map(|i| 120.0 - i as f64).collect();
        closes.extend((1..7).map(|i| 100.0 + i as f64));
        closes.extend((1..6).map(|i| 106.0 - i as f64));
        closes.extend((1..6).map(|i| 101.0 + i as f64));
        closes
    }

    #[test]
    fn test_bullish_divergences_on_lower_low() {
        let fixture = Fixture::new(bars_from_closes(&slowing_decline(), |_| 1_000.0));
        let found = divergences(&fixture.input(), &CombinationParams::default());
        assert_eq!(
            spans(&found),
            vec![
                (codes::RSI_BULLISH_DIVERGENCE, 31, 51),
                (codes::MACD_BULLISH_DIVERGENCE, 31, 51),
                (codes::VWAP_BULLISH_DIVERGENCE, 31, 51),
            ]
        );
        for p in &found {
            assert_eq!(p.signal, Direction::Bullish);
            assert!(p.target_price > p.entry_price && p.stop_loss < p.entry_price);
        }
    }

    #[test]
    fn test_bearish_divergences_on_higher_high() {
        let closes: Vec<f64> = slowing_decline().iter().map(|c| 230.0 - c).collect();
        let fixture = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        let found = divergences(&fixture.input(), &CombinationParams::default());
        assert_eq!(
            spans(&found),
            vec![
                (codes::RSI_BEARISH_DIVERGENCE, 31, 51),
                (codes::MACD_BEARISH_DIVERGENCE, 31, 51),
                (codes::VWAP_BEARISH_DIVERGENCE, 31, 51),
            ]
        );
        assert!(found.iter().all(|p| p.signal == Direction::Bearish));
    }

    #[test]
    fn test_stochastic_divergences() {
        let mut bars = flat_bars(&wicked_retest());
        bars[31].low = 98.0;
        let fixture = Fixture::new(bars);
        let k = &fixture.indicators.stochastic().unwrap().k;
        assert!(k[31].unwrap() > k[20].unwrap());
        assert_eq!(
            spans(&divergences(&fixture.input(), &CombinationParams::default())),
            vec![
                (codes::RSI_BULLISH_DIVERGENCE, 20, 31),
                (codes::STOCH_BULLISH_DIVERGENCE, 20, 31),
                (codes::VWAP_BULLISH_DIVERGENCE, 20, 31),
            ]
        );

        let closes: Vec<f64> = wicked_retest().iter().map(|c| 200.0 - c).collect();
        let mut bars = flat_bars(&closes);
        bars[31].high = 102.0;
        let fixture = Fixture::new(bars);
        assert_eq!(
            spans(&divergences(&fixture.input(), &CombinationParams::default())),
            vec![
                (codes::RSI_BEARISH_DIVERGENCE, 20, 31),
                (codes::STOCH_BEARISH_DIVERGENCE, 20, 31),
                (codes::VWAP_BEARISH_DIVERGENCE, 20, 31),
            ]
        );
    }

    #[test]
    fn test_macd_crosses() {
        let fixture = Fixture::new(bars_from_closes(&slowing_decline(), |_| 1_000.0));
        let found = macd_crosses(&fixture.input());
        assert_eq!(
            spans(&found),
            vec![
                (codes::MACD_BEARISH_CROSS, 49, 50),
                (codes::MACD_BULLISH_CROSS, 52, 53),
            ]
        );
        assert_eq!(found[1].signal, Direction::Bullish);
    }

    #[test]
    fn test_stochastic_zone_crosses() {
        let fixture = Fixture::new(bars_from_closes(&slowing_decline(), |_| 1_000.0));
        let found = stochastic_crosses(&fixture.input(), &CombinationParams::default());
        assert_eq!(
            spans(&found),
            vec![
                (codes::STOCH_OVERSOLD_CROSS, 30, 31),
                (codes::STOCH_OVERBOUGHT_CROSS, 38, 39),
                (codes::STOCH_OVERSOLD_CROSS, 51, 52),
            ]
        );
    }

    #[test]
    fn test_vwap_reclaim_and_rejection() {
        let mut closes = vec![100.0; 10];
        closes.extend((1..6).map(|i| 100.0 - i as f64));
        closes.extend((1..6).map(|i| 95.0 + 2.0 * i as f64));
        closes.extend((1..7).map(|i| 105.0 - 2.0 * i as f64));
        let fixture = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        let found = vwap_crosses(&fixture.input());
        assert_eq!(
            spans(&found),
            vec![
                (codes::VWAP_REJECTION, 9, 10),
                (codes::VWAP_RECLAIM, 15, 16),
                (codes::VWAP_REJECTION, 21, 22),
            ]
        );
        assert_eq!(found[1].entry_price, 99.0);
    }

    #[test]
    fn test_death_cross_brackets_crossing() {
        let closes: Vec<f64> = (0..400)
            .map(|i| {
                if i < 250 {
                    100.0 + i as f64 * 0.3
                } else {
                    175.0 - (i - 250) as f64 * 1.5
                }
            })
            .collect();
        let fixture = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        let input = fixture.input();

        let fast = input.indicators.sma(50).unwrap();
        let slow = input.indicators.sma(200).unwrap();
        let cross = (200..400)
            .find(|&i| {
                fast[i - 1].unwrap() >= slow[i - 1].unwrap() && fast[i].unwrap() < slow[i].unwrap()
            })
            .unwrap();

        let found = trend_crosses(&input, &CombinationParams::default());
        assert_eq!(spans(&found), vec![(codes::DEATH_CROSS, cross - 1, cross)]);
        assert_eq!(found[0].signal, Direction::Bearish);
    }

    #[test]
    fn test_support_breakdown_needs_volume() {
        // three touches of support near 104, then a break lower
        let mut closes = Vec::new();
        for _ in 0..3 {
            closes.extend([110.0, 108.0, 106.0, 104.0, 106.0, 108.0, 110.0]);
        }
        closes.extend([108.0, 106.0, 105.0, 101.0]);
        let n = closes.len();

        let loud = Fixture::new(bars_from_closes(&closes, |i| if i == n - 1 { 5_000.0 } else { 1_000.0 }));
        let found = level_breakouts(&loud.input(), &CombinationParams::default());
        assert_eq!(spans(&found), vec![(codes::BREAKDOWN_VOLUME, n - 2, n - 1)]);
        let p = &found[0];
        assert_eq!(p.signal, Direction::Bearish);
        assert_eq!(p.entry_price, 101.0);
        assert!(p.stop_loss >= 103.5 && p.target_price < p.entry_price);

        let quiet = Fixture::new(bars_from_closes(&closes, |_| 1_000.0));
        assert!(level_breakouts(&quiet.input(), &CombinationParams::default()).is_empty());
    }

    #[test]
    fn test_triple_bottom() {
        let mut closes = vec![104.0, 103.0, 102.0];
        for _ in 0..3 {
            closes.extend([101.0, 99.0, 97.0, 95.0, 97.0, 99.0, 101.0, 103.0]);
        }
        closes.extend([104.0, 105.0, 106.0, 107.0]);
        let fixture = Fixture::new(flat_bars(&closes));
        let found = triple_tops_bottoms(&fixture.input(), &CombinationParams::default());
        assert_eq!(spans(&found), vec![(codes::TRIPLE_BOTTOM, 6, 27)]);
        let p = &found[0];
        assert_eq!(p.signal, Direction::Bullish);
        assert_eq!(p.entry_price, 103.5);
        assert_eq!(p.target_price, 112.5);
        assert_eq!(p.stop_loss, 94.5);
    }

    #[test]
    fn test_ascending_triangle() {
        let closes = [
            106.0, 105.0, 104.0, 102.0, 100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 108.0, 106.0,
            104.0, 103.0, 105.0, 107.0, 109.0, 110.0, 108.0, 107.0, 106.0, 108.0, 109.0, 111.0,
            112.0,
        ];
        let fixture = Fixture::new(flat_bars(&closes));
        let found = ascending_triangles(&fixture.input(), &CombinationParams::default());
        assert_eq!(spans(&found), vec![(codes::ASCENDING_TRIANGLE, 4, 23)]);
        let p = &found[0];
        assert_eq!(p.entry_price, 110.5);
        assert_eq!(p.target_price, 121.5);
        assert_eq!(p.stop_loss, 102.5);
    }

    #[test]
    fn test_missing_indicators_yield_nothing() {
        let bars = bars_from_closes(&[100.0, 101.0, 99.0, 102.0], |_| 10.0);
        let series = Series::from_bars(&bars).unwrap();
        let indicators = IndicatorSet::default();
        let contexts = MarketContext::compute_all(&series, &EngineConfig::default().context);
        let kb = KnowledgeBase::builtin();
        let input = MatchInput {
            series: &series,
            indicators: &indicators,
            levels: &[],
            contexts: &contexts,
            knowledge: &kb,
        };
        assert!(macd_crosses(&input).is_empty());
        assert!(vwap_crosses(&input).is_empty());
        assert!(trend_crosses(&input, &CombinationParams::default()).is_empty());
        assert!(divergences(&input, &CombinationParams::default()).is_empty());
    }
}
